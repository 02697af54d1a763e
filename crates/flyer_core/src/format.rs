//! Locale-aware price formatting for printed flyers.

/// How prices are printed. The default matches Czech retail print: `1 234 Kč`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceFormat {
    pub thousands_separator: String,
    pub decimal_separator: String,
    pub decimals: usize,
    pub currency_suffix: String,
}

impl Default for PriceFormat {
    fn default() -> Self {
        Self {
            thousands_separator: " ".to_string(),
            decimal_separator: ",".to_string(),
            decimals: 0,
            currency_suffix: " Kč".to_string(),
        }
    }
}

impl PriceFormat {
    pub fn format(&self, amount: f64) -> String {
        let fixed = format!("{:.*}", self.decimals, amount.abs());
        let (whole, fraction) = match fixed.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (fixed.as_str(), None),
        };

        let digits: Vec<char> = whole.chars().collect();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, digit) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push_str(&self.thousands_separator);
            }
            grouped.push(*digit);
        }

        let sign = if amount < 0.0 && fixed.chars().any(|c| c != '0' && c != '.') {
            "-"
        } else {
            ""
        };
        match fraction {
            Some(fraction) => format!(
                "{sign}{grouped}{}{fraction}{}",
                self.decimal_separator, self.currency_suffix
            ),
            None => format!("{sign}{grouped}{}", self.currency_suffix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn czech_thousands_grouping() {
        let format = PriceFormat::default();
        assert_eq!(format.format(1234.0), "1 234 Kč");
        assert_eq!(format.format(999.0), "999 Kč");
        assert_eq!(format.format(1_234_567.0), "1 234 567 Kč");
        assert_eq!(format.format(12_990.4), "12 990 Kč");
    }

    #[test]
    fn decimals_and_custom_suffix() {
        let format = PriceFormat {
            thousands_separator: ".".to_string(),
            decimal_separator: ",".to_string(),
            decimals: 2,
            currency_suffix: " EUR".to_string(),
        };
        assert_eq!(format.format(1234.5), "1.234,50 EUR");
        assert_eq!(format.format(-20.0), "-20,00 EUR");
        assert_eq!(format.format(0.0), "0,00 EUR");
    }
}
