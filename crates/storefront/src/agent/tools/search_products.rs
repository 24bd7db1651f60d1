//! `searchProducts` - catalog search by text, category and TZS price range.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::{ToolError, ensure_object, optional_str};
use crate::claude::Tool;
use crate::services::{ProductCatalog, ProductQuery};

/// Tool name as the model sees it.
pub const NAME: &str = "searchProducts";

const NO_RESULTS_MESSAGE: &str =
    "No products found matching your search. Suggest broadening the search or removing filters.";

/// Catalog search capability. Always available.
#[derive(Clone)]
pub struct SearchProductsTool {
    catalog: Arc<dyn ProductCatalog>,
}

impl SearchProductsTool {
    #[must_use]
    pub fn new(catalog: Arc<dyn ProductCatalog>) -> Self {
        Self { catalog }
    }

    /// Definition sent to the model.
    #[must_use]
    pub fn definition() -> Tool {
        Tool {
            name: NAME.to_string(),
            description: "Search the Stephan's Pet Store catalog by text, category and price \
                range (TZS). Returns matching products with price, stock status and product link."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Text search for product name/description, e.g. \"dog food\". Empty string for none."
                    },
                    "category": {
                        "type": "string",
                        "description": "Category name, e.g. \"Cat Food\". Empty string for any category."
                    },
                    "minPrice": {
                        "type": "number",
                        "description": "Minimum price in TZS. 0 means no minimum."
                    },
                    "maxPrice": {
                        "type": "number",
                        "description": "Maximum price in TZS. 0 means no maximum."
                    }
                }
            }),
        }
    }

    /// Run a search.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::InvalidInput` for malformed arguments, negative
    /// prices or an inverted range, and `ToolError::Catalog` if the search fails.
    #[instrument(skip(self, input))]
    pub async fn invoke(&self, input: &Value) -> Result<Value, ToolError> {
        let query = parse_input(input)?;
        let products = self.catalog.search(&query).await?;

        info!(
            query = ?query.query,
            category = ?query.category,
            results = products.len(),
            "Product search completed"
        );

        let mut output = json!({
            "totalResults": products.len(),
            "products": products,
        });
        if products.is_empty() {
            output["message"] = json!(NO_RESULTS_MESSAGE);
        }

        Ok(output)
    }
}

/// Parse and validate tool arguments into a normalized catalog filter.
fn parse_input(input: &Value) -> Result<ProductQuery, ToolError> {
    ensure_object(input)?;

    let min_price = parse_price(input, "minPrice")?;
    let max_price = parse_price(input, "maxPrice")?;

    if let (Some(min), Some(max)) = (min_price, max_price)
        && !min.is_zero()
        && !max.is_zero()
        && min > max
    {
        return Err(ToolError::InvalidInput(format!(
            "minPrice ({min}) is greater than maxPrice ({max})"
        )));
    }

    Ok(ProductQuery::new(
        optional_str(input, "query")?,
        optional_str(input, "category")?,
        min_price,
        max_price,
    ))
}

/// Read a price bound. Missing, `null` and `""` are unbounded; numeric
/// strings are accepted.
fn parse_price(input: &Value, field: &str) -> Result<Option<Decimal>, ToolError> {
    let price = match input.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => number_to_decimal(n),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => Decimal::from_str(s.trim().replace(',', "").as_str()).ok(),
        Some(_) => None,
    }
    .ok_or_else(|| ToolError::InvalidInput(format!("{field} must be a number")))?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(ToolError::InvalidInput(format!(
            "{field} cannot be negative"
        )));
    }

    Ok(Some(price))
}

fn number_to_decimal(n: &serde_json::Number) -> Option<Decimal> {
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Decimal::from(u));
    }
    n.as_f64().and_then(|f| Decimal::try_from(f).ok())
}
