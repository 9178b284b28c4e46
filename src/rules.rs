//! Rule-based category resolution.
//!
//! An ordered, first-match-wins list of keyword rules covers the common
//! merchant brands; direction defaults, investment vocabulary and the live
//! pool handle the rest. Anything that still falls through lands in the
//! "General" bucket and becomes a candidate for AI reclassification.

use crate::model::Category;

/// Canonical label -> lowercase substrings that map to it. Evaluated in
/// order against the full message context; the first hit wins. Tuned to the
/// UPI/NEFT/IMPS banking ecosystem; treat as configuration, not logic.
pub const KEYWORD_RULES: &[(&str, &[&str])] = &[
    (
        "Food",
        &[
            "zomato", "swiggy", "dominos", "mcdonald", "kfc", "pizza", "burger", "biryani",
            "restaurant", "cafe", "dhaba", "eatery",
        ],
    ),
    (
        "Groceries",
        &[
            "bigbasket", "blinkit", "zepto", "grofers", "dmart", "grocery", "kirana",
            "supermarket", "reliance fresh",
        ],
    ),
    (
        "Shopping",
        &[
            "amazon", "flipkart", "myntra", "ajio", "meesho", "nykaa", "snapdeal", "tatacliq",
            "decathlon", "mall",
        ],
    ),
    (
        "Transport",
        &[
            "uber", "ola", "rapido", "irctc", "redbus", "metro", "petrol", "diesel", "fuel",
            "fastag", "parking", "indigo", "air india", "makemytrip",
        ],
    ),
    (
        "Entertainment",
        &[
            "netflix", "hotstar", "spotify", "bookmyshow", "prime video", "sonyliv", "gaming",
            "playstation", "cinema", "pvr", "inox",
        ],
    ),
    (
        "Bills",
        &[
            "electricity", "recharge", "jio", "airtel", "vodafone", "bsnl", "broadband", "dth",
            "postpaid", "water bill", "gas bill", "bescom", "tneb",
        ],
    ),
    (
        "Health",
        &[
            "pharmacy", "apollo", "1mg", "pharmeasy", "netmeds", "practo", "hospital", "clinic",
            "diagnostic", "medplus",
        ],
    ),
    ("Rent", &["rent", "landlord", "nobroker pay"]),
    (
        "Education",
        &["udemy", "coursera", "byjus", "unacademy", "school fee", "tuition", "college"],
    ),
];

/// Income-direction vocabulary that points at salary-like inflows.
pub const PAYCHECK_KEYWORDS: &[&str] = &[
    "salary", "sal credited", "interest", "int.pd", "refund", "reversal", "cashback", "dividend",
];

pub const INVESTMENT_KEYWORDS: &[&str] = &[
    "zerodha", "groww", "upstox", "kite", "coin", "mutual fund", "mutualfund", "sip", "nse",
    "bse", "stocks", "etf", "ppf", "nps", "fd booked",
];

/// Generic movement vocabulary carrying no category signal of its own.
pub const TRANSFER_KEYWORDS: &[&str] = &[
    "upi", "imps", "neft", "rtgs", "transfer", "payment", "paytm", "phonepe", "gpay",
    "google pay",
];

pub const GENERAL_LABEL: &str = "General";
pub const PAYCHECK_LABEL: &str = "Paycheck";
pub const INCOME_LABEL: &str = "Income";
pub const INVESTMENTS_LABEL: &str = "Investments";

/// Visual defaults for lazily created categories.
const CATEGORY_STYLES: &[(&str, &str, &str)] = &[
    ("Food", "🍔", "#FF7043"),
    ("Groceries", "🛒", "#66BB6A"),
    ("Shopping", "🛍️", "#AB47BC"),
    ("Transport", "🚕", "#42A5F5"),
    ("Entertainment", "🎬", "#EC407A"),
    ("Bills", "🧾", "#FFA726"),
    ("Health", "💊", "#26A69A"),
    ("Rent", "🏠", "#8D6E63"),
    ("Education", "📚", "#5C6BC0"),
    ("Paycheck", "💵", "#2E7D32"),
    ("Income", "💰", "#388E3C"),
    ("Investments", "📈", "#00897B"),
    ("General", "💳", "#9E9E9E"),
];

const DEFAULT_STYLE: (&str, &str) = ("💳", "#9E9E9E");

pub fn style_for(label: &str) -> (&'static str, &'static str) {
    CATEGORY_STYLES
        .iter()
        .find(|(l, _, _)| l.eq_ignore_ascii_case(label))
        .map(|(_, emoji, color)| (*emoji, *color))
        .unwrap_or(DEFAULT_STYLE)
}

/// Outcome of a resolution. `created` is populated when the winning label
/// had no pool entry and a category was synthesized; callers accumulate
/// these and merge them into the persisted pool.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub category: Category,
    pub matched_keyword: Option<String>,
    pub created: Option<Category>,
}

/// Resolves a category for free text. First match wins, in order:
/// keyword table, direction defaults, investment vocabulary, live pool
/// labels, generic transfer vocabulary, then "General".
pub fn resolve(
    merchant_text: &str,
    full_context: &str,
    pool: &[Category],
    is_income: bool,
) -> Resolution {
    let context = full_context.to_lowercase();

    for (label, keywords) in KEYWORD_RULES {
        if let Some(keyword) = keywords.iter().find(|k| context.contains(**k)) {
            let (category, created) = find_or_create(label, pool);
            return Resolution {
                category,
                matched_keyword: Some((*keyword).to_string()),
                created,
            };
        }
    }

    if is_income {
        let label = if PAYCHECK_KEYWORDS.iter().any(|k| context.contains(*k)) {
            PAYCHECK_LABEL
        } else {
            INCOME_LABEL
        };
        let (category, created) = find_or_create(label, pool);
        return Resolution {
            category,
            matched_keyword: None,
            created,
        };
    }

    if INVESTMENT_KEYWORDS.iter().any(|k| context.contains(*k)) {
        let (category, created) = find_or_create(INVESTMENTS_LABEL, pool);
        return Resolution {
            category,
            matched_keyword: None,
            created,
        };
    }

    // user-custom categories: any live pool label appearing in the text
    let merchant = merchant_text.to_lowercase();
    if let Some(hit) = pool.iter().find(|c| {
        let label = c.label.to_lowercase();
        !label.is_empty() && (context.contains(&label) || merchant.contains(&label))
    }) {
        return Resolution {
            category: hit.clone(),
            matched_keyword: None,
            created: None,
        };
    }

    // bare transfer vocabulary: recognized wording, but no category signal
    if let Some(keyword) = TRANSFER_KEYWORDS.iter().find(|k| context.contains(**k)) {
        let (category, created) = find_or_create(GENERAL_LABEL, pool);
        return Resolution {
            category,
            matched_keyword: Some((*keyword).to_string()),
            created,
        };
    }

    let (category, created) = find_or_create(GENERAL_LABEL, pool);
    Resolution {
        category,
        matched_keyword: None,
        created,
    }
}

/// Shortcut ordering used by the statement parser: income and investment
/// vocabulary are checked before the generic keyword table, because
/// statement descriptions lead with NEFT/ACH wording that the brand table
/// would otherwise misread.
pub fn resolve_for_statement(
    merchant_text: &str,
    full_context: &str,
    pool: &[Category],
    is_income: bool,
) -> Resolution {
    let context = full_context.to_lowercase();

    if is_income && PAYCHECK_KEYWORDS.iter().any(|k| context.contains(*k)) {
        let (category, created) = find_or_create(PAYCHECK_LABEL, pool);
        return Resolution {
            category,
            matched_keyword: None,
            created,
        };
    }

    if INVESTMENT_KEYWORDS.iter().any(|k| context.contains(*k)) {
        let (category, created) = find_or_create(INVESTMENTS_LABEL, pool);
        return Resolution {
            category,
            matched_keyword: None,
            created,
        };
    }

    resolve(merchant_text, full_context, pool, is_income)
}

/// Finds `label` in the pool (case-insensitive) or synthesizes a category
/// with the default style for that label.
pub fn find_or_create(label: &str, pool: &[Category]) -> (Category, Option<Category>) {
    if let Some(existing) = pool.iter().find(|c| c.matches_label(label)) {
        return (existing.clone(), None);
    }

    let (emoji, color) = style_for(label);
    let is_known_style = CATEGORY_STYLES
        .iter()
        .any(|(l, _, _)| l.eq_ignore_ascii_case(label));
    let category = Category::new(label, emoji, color, !is_known_style);
    (category.clone(), Some(category))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<Category> {
        vec![
            Category::new("Food", "🍔", "#FF7043", false),
            Category::new("General", "💳", "#9E9E9E", false),
            Category::new("Gym", "🏋️", "#FF5252", true),
        ]
    }

    #[test]
    fn keyword_rule_wins_and_reports_keyword() {
        let r = resolve("Zomato", "Rs.250 paid to zomato via UPI", &pool(), false);
        assert_eq!(r.category.label, "Food");
        assert_eq!(r.matched_keyword.as_deref(), Some("zomato"));
        assert!(r.created.is_none());
    }

    #[test]
    fn keyword_rule_outranks_pool_match() {
        // "gym" is in the pool but "uber" hits the keyword table first
        let r = resolve("Uber Gym", "paid to uber gym services", &pool(), false);
        assert_eq!(r.category.label, "Transport");
        assert!(r.created.is_some());
    }

    #[test]
    fn income_with_salary_vocab_is_paycheck() {
        let r = resolve("Acme Corp", "salary credited to a/c", &pool(), true);
        assert_eq!(r.category.label, "Paycheck");
    }

    #[test]
    fn income_without_vocab_is_generic_income() {
        let r = resolve("Someone", "credited by a/c transfer", &pool(), true);
        assert_eq!(r.category.label, "Income");
    }

    #[test]
    fn investment_vocab_maps_to_investments() {
        let r = resolve("Zerodha", "debited towards zerodha kite", &pool(), false);
        assert_eq!(r.category.label, "Investments");
    }

    #[test]
    fn custom_pool_label_matches_by_substring() {
        let r = resolve("Cult Gym", "paid to cult gym membership", &pool(), false);
        assert_eq!(r.category.label, "Gym");
        assert!(r.category.is_custom);
    }

    #[test]
    fn bare_transfer_vocab_falls_to_general() {
        let r = resolve("John", "upi payment to john", &pool(), false);
        assert_eq!(r.category.label, "General");
        assert_eq!(r.matched_keyword.as_deref(), Some("upi"));
        assert!(r.created.is_none()); // General already in pool
    }

    #[test]
    fn unrecognized_text_falls_to_general_without_keyword() {
        let r = resolve("Mystery", "mystery spend somewhere", &pool(), false);
        assert_eq!(r.category.label, "General");
        assert!(r.matched_keyword.is_none());
    }

    #[test]
    fn created_category_carries_style_defaults() {
        let (cat, created) = find_or_create("Transport", &pool());
        assert_eq!(cat.emoji, "🚕");
        assert_eq!(created.unwrap().label, "Transport");
    }

    #[test]
    fn unknown_label_is_custom_with_default_style() {
        let (cat, created) = find_or_create("Pet Care", &pool());
        assert!(cat.is_custom);
        assert_eq!(cat.emoji, "💳");
        assert!(created.is_some());
    }

    #[test]
    fn statement_order_checks_income_before_keyword_table() {
        // "interest" inflow from a bank whose wording also contains "fd"
        let r = resolve_for_statement("Bank", "int.pd fd 00000", &pool(), true);
        assert_eq!(r.category.label, "Paycheck");
    }
}
