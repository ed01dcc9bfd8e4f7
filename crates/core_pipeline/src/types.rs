//! Core types for the receipt extraction pipeline
//!
//! The model decides which fields it emits, so the authoritative result is
//! an untyped JSON object. [`Receipt`] and [`LineItem`] are lenient typed
//! views over the fields the extraction prompt asks for.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured JSON object recovered from a model response
///
/// Serializes transparently as the underlying object, keeping the order in
/// which the model emitted the keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionResult(Map<String, Value>);

impl ExtractionResult {
    /// Wrap a JSON value, returning `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Interpret the object as a receipt
    ///
    /// Fields of the wrong shape are dropped rather than failing the whole
    /// conversion, so a model that writes `"total_due": "N/A"` still yields
    /// the vendor and items.
    pub fn to_receipt(&self) -> Receipt {
        let text = |key: &str| self.get(key).and_then(Value::as_str).map(str::to_string);
        let number = |key: &str| self.get(key).and_then(Value::as_f64);

        let items = self
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(LineItem::from_value).collect())
            .unwrap_or_default();

        Receipt {
            vendor_name: text("vendor_name"),
            invoice_number: text("invoice_number"),
            invoice_date: text("invoice_date"),
            due_date: text("due_date"),
            items,
            subtotal: number("subtotal"),
            tax_rate_percent: number("tax_rate_percent"),
            tax_amount: number("tax_amount"),
            discount: number("discount"),
            total_due: number("total_due"),
        }
    }
}

/// Typed view of an extracted receipt or invoice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub vendor_name: Option<String>,
    pub invoice_number: Option<String>,
    /// Expected as YYYY-MM-DD, not validated
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub items: Vec<LineItem>,
    pub subtotal: Option<f64>,
    pub tax_rate_percent: Option<f64>,
    pub tax_amount: Option<f64>,
    pub discount: Option<f64>,
    pub total_due: Option<f64>,
}

/// A single purchased line on a receipt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total: Option<f64>,
    pub currency: Option<String>,
    pub category: Option<ItemCategory>,
}

impl LineItem {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
        let number = |key: &str| object.get(key).and_then(Value::as_f64);

        Some(Self {
            description: text("description"),
            quantity: number("quantity"),
            unit_price: number("unit_price"),
            total: number("total"),
            currency: text("currency"),
            category: object
                .get("category")
                .and_then(Value::as_str)
                .map(ItemCategory::parse),
        })
    }
}

/// Spending category the model is asked to assign to each item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCategory {
    Food,
    Groceries,
    Transport,
    Shopping,
    Entertainment,
    Utilities,
    Subscriptions,
    Healthcare,
    Other,
}

impl ItemCategory {
    pub const ALL: [ItemCategory; 9] = [
        ItemCategory::Food,
        ItemCategory::Groceries,
        ItemCategory::Transport,
        ItemCategory::Shopping,
        ItemCategory::Entertainment,
        ItemCategory::Utilities,
        ItemCategory::Subscriptions,
        ItemCategory::Healthcare,
        ItemCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Food => "FOOD",
            ItemCategory::Groceries => "GROCERIES",
            ItemCategory::Transport => "TRANSPORT",
            ItemCategory::Shopping => "SHOPPING",
            ItemCategory::Entertainment => "ENTERTAINMENT",
            ItemCategory::Utilities => "UTILITIES",
            ItemCategory::Subscriptions => "SUBSCRIPTIONS",
            ItemCategory::Healthcare => "HEALTHCARE",
            ItemCategory::Other => "OTHER",
        }
    }

    /// Case-insensitive parse; anything unrecognised is `Other`
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(label))
            .unwrap_or(ItemCategory::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extraction_result_rejects_non_objects() {
        assert!(ExtractionResult::from_value(json!([1, 2, 3])).is_none());
        assert!(ExtractionResult::from_value(json!("text")).is_none());
        assert!(ExtractionResult::from_value(json!({})).is_some());
    }

    #[test]
    fn test_extraction_result_serializes_transparently_in_order() {
        let value = json!({"vendor_name": "Acme", "items": [], "total_due": 100});
        let result = ExtractionResult::from_value(value).unwrap();

        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"vendor_name":"Acme","items":[],"total_due":100}"#);
    }

    #[test]
    fn test_to_receipt_is_lenient() {
        let value = json!({
            "vendor_name": "Warung Kopi",
            "invoice_date": "2015-12-05",
            "items": [
                {"description": "Coffee", "quantity": 2, "unit_price": 15000,
                 "total": 30000, "currency": "IDR", "category": "food"},
                "not an item"
            ],
            "total_due": "N/A"
        });
        let receipt = ExtractionResult::from_value(value).unwrap().to_receipt();

        assert_eq!(receipt.vendor_name.as_deref(), Some("Warung Kopi"));
        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].quantity, Some(2.0));
        assert_eq!(receipt.items[0].category, Some(ItemCategory::Food));
        assert_eq!(receipt.total_due, None);
    }

    #[test]
    fn test_item_category_parse() {
        assert_eq!(ItemCategory::parse("GROCERIES"), ItemCategory::Groceries);
        assert_eq!(ItemCategory::parse(" healthcare "), ItemCategory::Healthcare);
        assert_eq!(ItemCategory::parse("Stationery"), ItemCategory::Other);
    }

    #[test]
    fn test_item_category_serialization() {
        let json = serde_json::to_string(&ItemCategory::Subscriptions).unwrap();
        assert_eq!(json, "\"SUBSCRIPTIONS\"");
    }
}
