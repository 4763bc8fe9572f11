use api_types::transaction::TransactionNew;
use chrono::{NaiveDate, TimeZone};
use dashboard::{DateRange, Money};

const DEFAULT_CARD: &str = "Cash";

/// A transaction typed on one line:
/// `[YYYY-MM-DD] amount merchant #Category/Subcategory [@card] [; description]`.
///
/// Underscores in the tag and card read as spaces (`#Food/Fast_Food`).
#[derive(Debug, Clone, PartialEq)]
pub struct QuickAdd {
    pub date: NaiveDate,
    pub amount: Money,
    pub merchant: String,
    pub primary_category: String,
    pub subcategory: String,
    pub card_type: String,
    pub description: String,
}

impl QuickAdd {
    /// The day is sent as its first instant in `tz`.
    pub fn into_new<Tz: TimeZone>(self, tz: &Tz) -> TransactionNew {
        let day = DateRange {
            start: self.date,
            end: self.date,
        };
        let (date, _) = day.to_instants(tz);
        TransactionNew {
            date,
            merchant: self.merchant,
            amount: self.amount.to_major(),
            primary_category: self.primary_category,
            subcategory: self.subcategory,
            card_type: self.card_type,
            description: self.description,
        }
    }
}

pub fn parse(input: &str, today: NaiveDate) -> Result<QuickAdd, String> {
    let (head, description) = match input.split_once(';') {
        Some((head, description)) => (head, description.trim()),
        None => (input, ""),
    };

    let mut tokens = head.split_whitespace().peekable();
    let date = match tokens.peek() {
        Some(first) if first.len() == 10 && first.contains('-') => {
            let date = NaiveDate::parse_from_str(first, "%Y-%m-%d")
                .map_err(|_| format!("Invalid date {first:?}, expected YYYY-MM-DD."))?;
            tokens.next();
            date
        }
        _ => today,
    };

    let amount_raw = tokens.next().ok_or("Enter an amount.")?;
    let amount: Money = amount_raw
        .parse()
        .map_err(|err| format!("Invalid amount {amount_raw:?}: {err}."))?;
    if amount.cents() <= 0 {
        return Err("Amount must be greater than zero.".to_string());
    }

    let mut tag: Option<(String, String)> = None;
    let mut card: Option<String> = None;
    let mut merchant: Vec<&str> = Vec::new();
    for token in tokens {
        if let Some(rest) = token.strip_prefix('#').filter(|rest| !rest.is_empty()) {
            if tag.is_some() {
                return Err("Only one #Category/Subcategory tag is allowed.".to_string());
            }
            let (category, subcategory) = rest
                .split_once('/')
                .filter(|(category, subcategory)| !category.is_empty() && !subcategory.is_empty())
                .ok_or("Tag must look like #Category/Subcategory.")?;
            tag = Some((spaced(category), spaced(subcategory)));
        } else if let Some(rest) = token.strip_prefix('@').filter(|rest| !rest.is_empty()) {
            card = Some(spaced(rest));
        } else {
            merchant.push(token);
        }
    }

    if merchant.is_empty() {
        return Err("Enter a merchant.".to_string());
    }
    let (primary_category, subcategory) =
        tag.ok_or("Add a #Category/Subcategory tag.")?;

    Ok(QuickAdd {
        date,
        amount,
        merchant: merchant.join(" "),
        primary_category,
        subcategory,
        card_type: card.unwrap_or_else(|| DEFAULT_CARD.to_string()),
        description: description.to_string(),
    })
}

fn spaced(raw: &str) -> String {
    raw.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn parses_full_line() {
        let parsed = parse(
            "2024-05-03 1250,50 HI-LO Liguanea #Food/Groceries @Visa ; weekly shop",
            today(),
        )
        .unwrap();
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        assert_eq!(parsed.amount, Money::new(125_050));
        assert_eq!(parsed.merchant, "HI-LO Liguanea");
        assert_eq!(parsed.primary_category, "Food");
        assert_eq!(parsed.subcategory, "Groceries");
        assert_eq!(parsed.card_type, "Visa");
        assert_eq!(parsed.description, "weekly shop");
    }

    #[test]
    fn defaults_to_today_and_cash() {
        let parsed = parse("800 Juici Patties #Food/Fast_Food", today()).unwrap();
        assert_eq!(parsed.date, today());
        assert_eq!(parsed.subcategory, "Fast Food");
        assert_eq!(parsed.card_type, "Cash");
        assert_eq!(parsed.description, "");
    }

    #[test]
    fn rejects_incomplete_lines() {
        assert!(parse("", today()).is_err());
        assert!(parse("abc Shop #A/B", today()).is_err());
        assert!(parse("0 Shop #A/B", today()).is_err());
        assert!(parse("10 #A/B", today()).is_err());
        assert!(parse("10 Shop", today()).is_err());
        assert!(parse("10 Shop #Food", today()).is_err());
        assert!(parse("10 Shop #A/B #C/D", today()).is_err());
        assert!(parse("2024-13-01 10 Shop #A/B", today()).is_err());
    }

    #[test]
    fn date_is_sent_as_local_midnight() {
        let parsed = parse("10 Shop #A/B", today()).unwrap();
        let new = parsed.into_new(&chrono_tz::America::Jamaica);
        assert_eq!(new.date.to_rfc3339(), "2024-05-10T05:00:00+00:00");
        assert_eq!(new.amount, 10.0);
    }
}
