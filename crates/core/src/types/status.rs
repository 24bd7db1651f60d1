//! Status enums for orders, stock levels, and chat messages.

use serde::{Deserialize, Serialize};

use super::ParseError;

/// Order lifecycle status.
///
/// Stored as lowercase text in `storefront.order.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order received, awaiting payment confirmation.
    #[default]
    Pending,
    /// Payment confirmed, preparing for shipment.
    Paid,
    /// On its way to the customer.
    Shipped,
    /// Successfully delivered.
    Delivered,
    /// Order was cancelled.
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Paid,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Wire value (`pending`, `paid`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Status glyph shown next to the label.
    #[must_use]
    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Pending => "⏳",
            Self::Paid => "✅",
            Self::Shipped => "📦",
            Self::Delivered => "🎉",
            Self::Cancelled => "❌",
        }
    }

    /// What the status means to the customer.
    #[must_use]
    pub const fn meaning(self) -> &'static str {
        match self {
            Self::Pending => "Order received, awaiting payment confirmation",
            Self::Paid => "Payment confirmed, preparing for shipment",
            Self::Shipped => "On its way to you",
            Self::Delivered => "Successfully delivered",
            Self::Cancelled => "Order was cancelled",
        }
    }

    /// Glyph and label together, e.g. `📦 Shipped`.
    #[must_use]
    pub fn display(self) -> String {
        format!("{} {}", self.glyph(), self.label())
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseError::OrderStatus(s.to_string()))
    }
}

/// Stock availability bucket for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// Units below which a product counts as low stock.
    pub const LOW_STOCK_THRESHOLD: i32 = 10;

    /// Bucket a raw stock count.
    #[must_use]
    pub const fn from_stock(stock: i32) -> Self {
        if stock <= 0 {
            Self::OutOfStock
        } else if stock < Self::LOW_STOCK_THRESHOLD {
            Self::LowStock
        } else {
            Self::InStock
        }
    }

    /// Human-readable stock message for a raw stock count.
    #[must_use]
    pub fn message(stock: i32) -> String {
        match Self::from_stock(stock) {
            Self::OutOfStock => "Out of stock".to_string(),
            Self::LowStock => format!("Only {stock} left in stock"),
            Self::InStock => "In stock".to_string(),
        }
    }
}

/// Role of a message in a shopping-assistant conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_parse_and_display() {
        for status in OrderStatus::ALL {
            let parsed: OrderStatus = status.as_str().parse().expect("parse");
            assert_eq!(parsed, status);
            assert_eq!(status.to_string(), status.as_str());
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_status_display_includes_glyph() {
        assert_eq!(OrderStatus::Shipped.display(), "📦 Shipped");
        assert_eq!(OrderStatus::Cancelled.display(), "❌ Cancelled");
    }

    #[test]
    fn test_order_status_serde_is_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Delivered).expect("serialize");
        assert_eq!(json, "\"delivered\"");
    }

    #[test]
    fn test_stock_status_thresholds() {
        assert_eq!(StockStatus::from_stock(-3), StockStatus::OutOfStock);
        assert_eq!(StockStatus::from_stock(0), StockStatus::OutOfStock);
        assert_eq!(StockStatus::from_stock(1), StockStatus::LowStock);
        assert_eq!(StockStatus::from_stock(9), StockStatus::LowStock);
        assert_eq!(StockStatus::from_stock(10), StockStatus::InStock);
    }

    #[test]
    fn test_stock_messages() {
        assert_eq!(StockStatus::message(0), "Out of stock");
        assert_eq!(StockStatus::message(3), "Only 3 left in stock");
        assert_eq!(StockStatus::message(42), "In stock");
    }
}
