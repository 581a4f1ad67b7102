//! Orders as every node sees them.
//!
//! An order is identified by the keccak256 hash of its content, so two nodes that
//! learn the same order from different sources (ledger event, peer gossip) agree
//! on its identity. Status changes keep an undo stack for reorg rollback.

use crate::types::{Address, BlockNumber, MarketId, OrderHash, Price, Side, Timestamp, BASE_SCALE, QUOTE_SCALE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// How the order entered the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Placed on chain, rests until filled or cancelled.
    Limit,
    /// Immediate or cancel. Carries an expiry and is dropped once it passes.
    Ioc,
    /// Signed off chain and spread by gossip.
    Signed,
}

impl OrderType {
    fn code(&self) -> u8 {
        match self {
            OrderType::Limit => 0,
            OrderType::Ioc => 1,
            OrderType::Signed => 2,
        }
    }

    pub fn requires_expiry(&self) -> bool {
        !matches!(self, OrderType::Limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Placed,
    Filled,
    Cancelled,
    ExecutionFailed,
}

/// A status the order held before a transition, kept for rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEntry {
    pub status: OrderStatus,
    pub info: String,
    pub block: BlockNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order quantity must be non-zero")]
    ZeroQuantity,
    #[error("order price must be positive, got {0}")]
    NonPositivePrice(Decimal),
    #[error("{0:?} orders need an expiry")]
    MissingExpiry(OrderType),
    #[error("quantity {0} does not fit the on-chain precision")]
    PrecisionOverflow(Decimal),
}

/// The hashed content of an order. Everything else on [`Order`] is node-local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderParams {
    pub order_type: OrderType,
    /// unix seconds, required for IOC and signed orders
    #[serde(default)]
    pub expire_at: Option<i64>,
    pub market: MarketId,
    pub trader: Address,
    /// positive = long, negative = short
    pub quantity: Decimal,
    pub price: Price,
    pub salt: u64,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub post_only: bool,
}

impl OrderParams {
    pub fn limit(market: MarketId, trader: Address, quantity: Decimal, price: Price, salt: u64) -> Self {
        Self {
            order_type: OrderType::Limit,
            expire_at: None,
            market,
            trader,
            quantity,
            price,
            salt,
            reduce_only: false,
            post_only: false,
        }
    }

    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity.is_zero() {
            return Err(OrderError::ZeroQuantity);
        }
        if self.price.value() <= Decimal::ZERO {
            return Err(OrderError::NonPositivePrice(self.price.value()));
        }
        if self.order_type.requires_expiry() && self.expire_at.is_none() {
            return Err(OrderError::MissingExpiry(self.order_type));
        }
        Ok(())
    }

    /// keccak256 over the order encoded as consecutive 32 byte words.
    pub fn hash(&self) -> Result<OrderHash, OrderError> {
        let mut hasher = Keccak256::new();
        hasher.update(uint_word(self.order_type.code() as u128));
        hasher.update(int_word(self.expire_at.unwrap_or(0) as i128));
        hasher.update(uint_word(self.market.0 as u128));
        hasher.update(address_word(&self.trader));
        hasher.update(int_word(fixed_point(self.quantity, BASE_SCALE)?));
        hasher.update(int_word(fixed_point(self.price.value(), QUOTE_SCALE)?));
        hasher.update(uint_word(self.salt as u128));
        hasher.update(uint_word(self.reduce_only as u128));
        hasher.update(uint_word(self.post_only as u128));
        Ok(OrderHash(hasher.finalize().into()))
    }
}

fn fixed_point(value: Decimal, scale: u32) -> Result<i128, OrderError> {
    let mut scaled = value;
    scaled.rescale(scale);
    if scaled.scale() != scale || scaled != value {
        return Err(OrderError::PrecisionOverflow(value));
    }
    Ok(scaled.mantissa())
}

fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

// two's complement, sign extended to 256 bits
fn int_word(value: i128) -> [u8; 32] {
    let mut word = if value < 0 { [0xffu8; 32] } else { [0u8; 32] };
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// An order signed off chain, the unit of gossip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOrder {
    pub order: OrderParams,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl SignedOrder {
    pub fn hash(&self) -> Result<OrderHash, OrderError> {
        self.order.hash()
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.order.expire_at.is_some_and(|at| at < now.as_secs())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text.strip_prefix("0x").unwrap_or(&text)).map_err(serde::de::Error::custom)
    }
}

/// 2.0: an order as stored on the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub hash: OrderHash,
    pub market: MarketId,
    pub trader: Address,
    pub order_type: OrderType,
    /// positive = long, negative = short
    pub quantity: Decimal,
    pub price: Price,
    /// same sign as quantity, never larger in magnitude
    pub filled: Decimal,
    pub salt: u64,
    pub reduce_only: bool,
    pub post_only: bool,
    pub expire_at: Option<i64>,
    pub block_placed: BlockNumber,
    pub status: OrderStatus,
    pub status_info: String,
    /// prior statuses, most recent last
    pub lifecycle: Vec<LifecycleEntry>,
    pub signature: Option<Vec<u8>>,
}

impl Order {
    pub fn new(params: OrderParams, block_placed: BlockNumber) -> Result<Self, OrderError> {
        params.validate()?;
        let hash = params.hash()?;
        Ok(Self {
            hash,
            market: params.market,
            trader: params.trader,
            order_type: params.order_type,
            quantity: params.quantity,
            price: params.price,
            filled: Decimal::ZERO,
            salt: params.salt,
            reduce_only: params.reduce_only,
            post_only: params.post_only,
            expire_at: params.expire_at,
            block_placed,
            status: OrderStatus::Placed,
            status_info: String::new(),
            lifecycle: Vec::new(),
            signature: None,
        })
    }

    pub fn from_signed(signed: SignedOrder, block_placed: BlockNumber) -> Result<Self, OrderError> {
        let mut order = Self::new(signed.order, block_placed)?;
        order.signature = Some(signed.signature);
        Ok(order)
    }

    pub fn side(&self) -> Side {
        if self.quantity > Decimal::ZERO {
            Side::Long
        } else {
            Side::Short
        }
    }

    pub fn is_long(&self) -> bool {
        self.side() == Side::Long
    }

    /// signed remaining quantity
    pub fn unfilled(&self) -> Decimal {
        self.quantity - self.filled
    }

    pub fn unfilled_abs(&self) -> Decimal {
        self.unfilled().abs()
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled.abs() == self.quantity.abs()
    }

    /// placed and with something left to fill, i.e. eligible for the book
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Placed && !self.unfilled().is_zero()
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expire_at.is_some_and(|at| at < now.as_secs())
    }

    pub fn params(&self) -> OrderParams {
        OrderParams {
            order_type: self.order_type,
            expire_at: self.expire_at,
            market: self.market,
            trader: self.trader,
            quantity: self.quantity,
            price: self.price,
            salt: self.salt,
            reduce_only: self.reduce_only,
            post_only: self.post_only,
        }
    }
}
