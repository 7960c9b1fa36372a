use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SmaCrossoverSettings {
    pub fast_period: u32,
    pub slow_period: u32,

    /// Quantity of base asset per entry/exit order.
    pub order_size: f64,

    /// Optional cap on a single order's quote value; registered as a
    /// position-size rule during initialization when positive.
    #[serde(default)]
    pub max_order_value: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DcaSettings {
    /// Quantity of base asset bought on every candle.
    pub order_size: f64,
}
