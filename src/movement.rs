//! The financial movement model and the ingestion of raw store rows.
//!
//! Rows come from the store loosely typed: dates are text, amounts may be
//! numbers or strings, and any column may be null. Ingestion validates each row
//! once, derives its [MovementKind] with the configured [SignConvention] and
//! drops rows that cannot be trusted rather than guessing at their values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{Error, money::amount_from_json};

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Category codes starting with this prefix are expenses under
/// [SignConvention::CategoryPrefix].
pub const EXPENSE_CATEGORY_PREFIX: &str = "2";

/// Whether a movement brings money in or takes it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Money coming in.
    Income,
    /// Money going out.
    Expense,
}

/// The rule used to classify movements as income or expense.
///
/// Exactly one convention is used for the whole process and it is applied at
/// ingestion, so every view sees the same classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignConvention {
    /// Negative amounts are expenses, everything else is income.
    #[default]
    AmountSign,
    /// Categories whose code starts with "2" are expenses, everything else is
    /// income.
    CategoryPrefix,
}

impl SignConvention {
    /// Classify a movement with `category` and `amount`.
    pub fn classify(self, category: &str, amount: Decimal) -> MovementKind {
        let is_expense = match self {
            SignConvention::AmountSign => amount.is_sign_negative() && !amount.is_zero(),
            SignConvention::CategoryPrefix => category.starts_with(EXPENSE_CATEGORY_PREFIX),
        };

        if is_expense {
            MovementKind::Expense
        } else {
            MovementKind::Income
        }
    }
}

impl std::str::FromStr for SignConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amount-sign" => Ok(Self::AmountSign),
            "category-prefix" => Ok(Self::CategoryPrefix),
            other => Err(format!(
                "unknown sign convention \"{other}\", expected \"amount-sign\" or \"category-prefix\""
            )),
        }
    }
}

/// A row of the `dmovimentacoes` table as returned by the store.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StoreRow {
    /// The date as `YYYY-MM-DD` text.
    #[serde(default)]
    pub data: Option<String>,
    /// The category label.
    #[serde(default)]
    pub rubrica: Option<String>,
    /// The bank the movement went through.
    #[serde(default)]
    pub banco: Option<String>,
    /// Who paid or was paid.
    #[serde(default)]
    pub pagador: Option<String>,
    /// The signed amount, either a JSON number or a numeric string.
    #[serde(default)]
    pub valor: serde_json::Value,
    /// Free text notes.
    #[serde(default)]
    pub descricao: Option<String>,
    /// The number of installments.
    #[serde(default)]
    pub parcelas: Option<i64>,
}

/// A validated financial movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movement {
    /// The day the movement happened.
    pub date: Date,
    /// The category ("rubrica") label, never empty.
    pub category: String,
    /// The signed amount.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Income or expense, fixed at ingestion.
    pub kind: MovementKind,
    /// The bank the movement went through.
    pub bank: Option<String>,
    /// Who paid or was paid.
    pub payer: Option<String>,
    /// Free text notes.
    pub description: Option<String>,
    /// The number of installments, at least one.
    pub installments: u32,
}

impl Movement {
    /// Create a movement with no descriptive attributes.
    pub fn new(
        date: Date,
        category: impl Into<String>,
        amount: Decimal,
        convention: SignConvention,
    ) -> Self {
        let category = category.into();
        let kind = convention.classify(&category, amount);

        Self {
            date,
            category,
            amount,
            kind,
            bank: None,
            payer: None,
            description: None,
            installments: 1,
        }
    }

    /// Set the bank.
    pub fn bank(mut self, bank: impl Into<String>) -> Self {
        self.bank = Some(bank.into());
        self
    }

    /// Set the payer.
    pub fn payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Why a store row was left out of the data set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The date is missing or is not a valid calendar date.
    InvalidDate(String),
    /// The amount is missing or is not a number.
    InvalidAmount,
    /// The category is missing or blank.
    MissingCategory,
}

/// The movements that survived ingestion and a count of the rows that did not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ingested {
    /// The valid movements, in store order.
    pub movements: Vec<Movement>,
    /// The number of rows skipped because they were malformed.
    pub skipped: usize,
}

/// Parse a `YYYY-MM-DD` date, ignoring any time part after a 'T' or space.
///
/// # Errors
/// Returns [Error::InvalidDate] if the text is not a valid calendar date.
pub fn parse_date(text: &str) -> Result<Date, Error> {
    let trimmed = text.trim();
    let date_part = trimmed
        .split_once(['T', ' '])
        .map_or(trimmed, |(date, _)| date);

    Date::parse(date_part, DATE_FORMAT).map_err(|error| Error::InvalidDate {
        text: text.to_owned(),
        reason: error.to_string(),
    })
}

/// Validate a single store row.
///
/// # Errors
/// Returns the [SkipReason] if the row cannot be turned into a [Movement].
pub fn movement_from_row(row: StoreRow, convention: SignConvention) -> Result<Movement, SkipReason> {
    let raw_date = row.data.unwrap_or_default();
    let date = parse_date(&raw_date).map_err(|_| SkipReason::InvalidDate(raw_date))?;

    let category = row
        .rubrica
        .map(|category| category.trim().to_owned())
        .filter(|category| !category.is_empty())
        .ok_or(SkipReason::MissingCategory)?;

    let amount = amount_from_json(&row.valor).ok_or(SkipReason::InvalidAmount)?;
    let kind = convention.classify(&category, amount);
    let installments = row
        .parcelas
        .and_then(|count| u32::try_from(count).ok())
        .filter(|&count| count > 0)
        .unwrap_or(1);

    Ok(Movement {
        date,
        category,
        amount,
        kind,
        bank: row.banco,
        payer: row.pagador,
        description: row.descricao,
        installments,
    })
}

/// Validate all `rows`, keeping the valid ones in order and counting the rest.
pub fn ingest_rows(rows: Vec<StoreRow>, convention: SignConvention) -> Ingested {
    let mut ingested = Ingested::default();

    for row in rows {
        match movement_from_row(row, convention) {
            Ok(movement) => ingested.movements.push(movement),
            Err(reason) => {
                tracing::warn!("skipping malformed movement row: {reason:?}");
                ingested.skipped += 1;
            }
        }
    }

    ingested
}
