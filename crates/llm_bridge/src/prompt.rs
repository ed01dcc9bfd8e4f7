//! Receipt extraction prompt
//!
//! The instruction text is fixed apart from two knobs: whether it goes to
//! the model bare or through the model's chat template, and whether the
//! currency is pinned to one code or read off the receipt.

use core_pipeline::ItemCategory;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// How the instruction is framed for the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// Prompt text is sent as-is, without the model's chat template
    #[default]
    Plain,
    /// Prompt is wrapped as a user turn using the model's chat template
    Chat,
}

impl PromptStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStyle::Plain => "plain",
            PromptStyle::Chat => "chat",
        }
    }
}

impl fmt::Display for PromptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "raw" => Ok(PromptStyle::Plain),
            "chat" | "chat-template" | "template" => Ok(PromptStyle::Chat),
            other => Err(format!("unknown prompt style '{other}' (expected plain or chat)")),
        }
    }
}

/// Which currency the model should report for monetary fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrencyRule {
    /// Always report this ISO code, whatever the receipt shows
    Fixed(String),
    /// Report the currency printed on the receipt
    AsPrinted,
}

impl Default for CurrencyRule {
    fn default() -> Self {
        CurrencyRule::Fixed("IDR".to_string())
    }
}

impl fmt::Display for CurrencyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyRule::Fixed(code) => f.write_str(code),
            CurrencyRule::AsPrinted => f.write_str("auto"),
        }
    }
}

impl FromStr for CurrencyRule {
    type Err = Infallible;

    /// `auto` (or empty) follows the receipt, anything else is a fixed code
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.is_empty() || code.eq_ignore_ascii_case("auto") {
            Ok(CurrencyRule::AsPrinted)
        } else {
            Ok(CurrencyRule::Fixed(code.to_ascii_uppercase()))
        }
    }
}

/// Prompt construction strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptConfig {
    pub style: PromptStyle,
    pub currency: CurrencyRule,
}

impl PromptConfig {
    /// Build the instruction text sent alongside the image
    pub fn render(&self) -> String {
        let mut prompt = String::from(
            "IMPORTANT: Read the ACTUAL text printed on this receipt/invoice image. \
             Do NOT make up or generate fake data.\n\n",
        );

        prompt.push_str(&self.currency_section());
        prompt.push_str(DATE_SECTION);
        prompt.push_str(&self.fields_section());
        prompt.push_str(&self.example_section());
        prompt.push_str(RULES_SECTION);
        prompt
    }

    fn currency_field(&self) -> String {
        match &self.currency {
            CurrencyRule::Fixed(code) => format!("string, ALWAYS \"{code}\""),
            CurrencyRule::AsPrinted => {
                "string, ISO 4217 code of the currency printed on the receipt".to_string()
            }
        }
    }

    fn currency_section(&self) -> String {
        match &self.currency {
            CurrencyRule::Fixed(code) => format!(
                "CURRENCY RULE:\n\
                 - Every monetary field uses the currency \"{code}\".\n\
                 - This holds even if no currency symbol is printed.\n\
                 - Never guess a different currency. Always output \"{code}\".\n\n"
            ),
            CurrencyRule::AsPrinted => "CURRENCY RULE:\n\
                 - Report the currency shown on the receipt as an ISO 4217 code (e.g. \"USD\", \"EUR\").\n\
                 - If no currency is visible, use null.\n\n"
                .to_string(),
        }
    }

    fn fields_section(&self) -> String {
        let categories: Vec<&str> = ItemCategory::ALL.iter().map(ItemCategory::as_str).collect();
        format!(
            "Extract these fields from what you SEE in the image:\n\
             - vendor_name (business name, usually at the top)\n\
             - invoice_number (invoice or receipt number, or null)\n\
             - invoice_date (YYYY-MM-DD)\n\
             - due_date (YYYY-MM-DD, or null if not present)\n\
             - items (array of objects; EVERY item has ALL of these fields):\n\
             \x20 - description (string)\n\
             \x20 - quantity (number)\n\
             \x20 - unit_price (number)\n\
             \x20 - total (number)\n\
             \x20 - currency ({currency})\n\
             \x20 - category (string, one of: {categories})\n\
             - subtotal (number)\n\
             - tax_rate_percent (number, e.g. 11.0 for 11%; 0 when no tax is shown)\n\
             - tax_amount (number; 0 when no tax is shown)\n\
             - discount (number; 0 when there is none)\n\
             - total_due (final amount to pay)\n\n",
            currency = self.currency_field(),
            categories = categories.join(", "),
        )
    }

    fn example_section(&self) -> String {
        let currency = match &self.currency {
            CurrencyRule::Fixed(code) => code.as_str(),
            CurrencyRule::AsPrinted => "USD",
        };
        format!(
            "Example item (every item follows this exact structure):\n\
             {{\"description\": \"Coffee\", \"quantity\": 2, \"unit_price\": 15000, \
             \"total\": 30000, \"currency\": \"{currency}\", \"category\": \"FOOD\"}}\n\n"
        )
    }
}

const DATE_SECTION: &str = "DATE RULE:\n\
- Convert EVERY date to YYYY-MM-DD (e.g. \"2015-12-05\").\n\
- \"05 Desember 2015\", \"5/12/2015\" and \"Dec 5, 2015\" all become \"2015-12-05\".\n\
- Month names in any language become month numbers.\n\n";

const RULES_SECTION: &str = "Rules:\n\
- Only extract data that is VISIBLE in the image; do not invent values.\n\
- Dates are always YYYY-MM-DD.\n\
- If the receipt shows no tax, VAT, PPN, service charge or similar, output tax_rate_percent = 0 and tax_amount = 0.\n\
- Use null for any other field that is not present.\n\
- Monetary values are numbers, not strings.\n\
- Return ONLY valid JSON, with no markdown or extra text.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_plain_with_idr() {
        let config = PromptConfig::default();
        assert_eq!(config.style, PromptStyle::Plain);
        assert_eq!(config.currency, CurrencyRule::Fixed("IDR".to_string()));

        let prompt = config.render();
        assert!(prompt.contains("Always output \"IDR\""));
        assert!(prompt.contains("ALWAYS \"IDR\""));
    }

    #[test]
    fn test_as_printed_currency_has_no_fixed_code() {
        let config = PromptConfig {
            style: PromptStyle::Chat,
            currency: CurrencyRule::AsPrinted,
        };
        let prompt = config.render();
        assert!(!prompt.contains("IDR"));
        assert!(prompt.contains("ISO 4217"));
    }

    #[test]
    fn test_prompt_lists_every_field_and_category() {
        let prompt = PromptConfig::default().render();
        for field in [
            "vendor_name",
            "invoice_number",
            "invoice_date",
            "due_date",
            "items",
            "subtotal",
            "tax_rate_percent",
            "tax_amount",
            "discount",
            "total_due",
        ] {
            assert!(prompt.contains(field), "missing field {field}");
        }
        for category in ItemCategory::ALL {
            assert!(prompt.contains(category.as_str()));
        }
        assert!(prompt.ends_with("Return ONLY valid JSON, with no markdown or extra text."));
    }

    #[test]
    fn test_prompt_style_parsing() {
        assert_eq!("plain".parse::<PromptStyle>().unwrap(), PromptStyle::Plain);
        assert_eq!("CHAT".parse::<PromptStyle>().unwrap(), PromptStyle::Chat);
        assert!("fancy".parse::<PromptStyle>().is_err());
    }

    #[test]
    fn test_currency_rule_parsing() {
        assert_eq!("auto".parse::<CurrencyRule>().unwrap(), CurrencyRule::AsPrinted);
        assert_eq!("".parse::<CurrencyRule>().unwrap(), CurrencyRule::AsPrinted);
        assert_eq!(
            "eur".parse::<CurrencyRule>().unwrap(),
            CurrencyRule::Fixed("EUR".to_string())
        );
        assert_eq!(CurrencyRule::AsPrinted.to_string(), "auto");
    }
}
