//! Report generation business logic.
//!
//! Every aggregate here is derived on demand from obligations and payment events; nothing
//! is stored as a running counter. Functions return structured data plus a couple of
//! text helpers (currency, progress bar) that a presentation layer can use as-is.

use crate::{
    core::{
        group::{GroupDetails, GroupStatus},
        ledger,
        obligation::{ObligationSnapshot, ObligationStatus},
        rotation,
    },
    entities::{group, member},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::ConnectionTrait;
use serde::Serialize;

/// Counts and sums over a set of obligations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContributionStats {
    /// Number of obligations
    pub total_contributions: usize,
    /// Obligations paid in full
    pub paid_contributions: usize,
    /// Obligations currently overdue
    pub late_contributions: usize,
    /// Sum owed, in minor units
    pub total_amount: i64,
    /// Sum of applied payments, in minor units
    pub paid_amount: i64,
}

/// Obligations of a group's current cycle with their aggregate stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionsView {
    /// Per-obligation state, ordered by period and rotation order
    pub obligations: Vec<ObligationSnapshot>,
    /// Aggregates over `obligations`
    pub stats: ContributionStats,
}

/// A group as shown to its members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupView {
    /// The group row
    pub group: group::Model,
    /// Members in rotation order
    pub members: Vec<member::Model>,
    /// Every payment ever applied to the group, in minor units
    pub total_saved: i64,
    /// Date of the next payout, `None` once the cycle is complete or the group closed
    pub next_payout_date: Option<NaiveDate>,
    /// Share of the current cycle's owed amount already paid (0-100)
    pub collection_progress: f64,
}

/// Headline numbers across a user's groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    /// Number of groups the user belongs to
    pub total_groups: usize,
    /// Sum of `total_saved` over those groups, in minor units
    pub active_savings: i64,
    /// Nearest upcoming payout date across the groups
    pub next_payment: Option<NaiveDate>,
}

/// Aggregates a set of obligation snapshots.
#[must_use]
pub fn contribution_stats(snapshots: &[ObligationSnapshot]) -> ContributionStats {
    snapshots
        .iter()
        .fold(ContributionStats::default(), |mut stats, snapshot| {
            stats.total_contributions += 1;
            stats.total_amount = stats
                .total_amount
                .saturating_add(snapshot.obligation.amount_owed);
            stats.paid_amount = stats.paid_amount.saturating_add(snapshot.paid_amount);
            match snapshot.status {
                ObligationStatus::Paid => stats.paid_contributions += 1,
                ObligationStatus::Late => stats.late_contributions += 1,
                ObligationStatus::Pending => {}
            }
            stats
        })
}

/// Loads the current cycle's obligations of a group as of `as_of`.
pub async fn contributions_view<C>(
    db: &C,
    group: &group::Model,
    as_of: DateTime<Utc>,
) -> Result<ContributionsView>
where
    C: ConnectionTrait,
{
    let obligations =
        ledger::load_cycle_snapshots(db, group.id, group.current_cycle, as_of).await?;
    let stats = contribution_stats(&obligations);
    Ok(ContributionsView { obligations, stats })
}

/// Derives the view of a group as of `as_of`.
pub async fn build_group_view<C>(
    db: &C,
    details: GroupDetails,
    as_of: DateTime<Utc>,
) -> Result<GroupView>
where
    C: ConnectionTrait,
{
    let GroupDetails { group, members } = details;

    let total_saved = ledger::total_applied_for_group(db, group.id, as_of).await?;
    let stats = contributions_view(db, &group, as_of).await?.stats;

    let next_payout_date = match GroupStatus::of(&group)? {
        GroupStatus::Active => Some(
            rotation::next_payout(db, group.id, as_of)
                .await?
                .payout_date,
        ),
        GroupStatus::Completed | GroupStatus::Closed => None,
    };

    Ok(GroupView {
        group,
        members,
        total_saved,
        next_payout_date,
        collection_progress: calculate_progress(stats.paid_amount, stats.total_amount),
    })
}

/// Summarizes the groups shown on a user's dashboard.
#[must_use]
pub fn summarize_dashboard(groups: &[GroupView]) -> DashboardSummary {
    DashboardSummary {
        total_groups: groups.len(),
        active_savings: groups
            .iter()
            .fold(0, |total, g| total.saturating_add(g.total_saved)),
        next_payment: groups.iter().filter_map(|g| g.next_payout_date).min(),
    }
}

/// Percentage of `total` covered by `paid`. Zero when nothing is owed.
#[must_use]
// Minor-unit sums stay far below 2^52.
#[allow(clippy::cast_precision_loss)]
pub fn calculate_progress(paid: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    (paid as f64 / total as f64) * 100.0
}

/// Generates a progress bar string for visual representation.
///
/// Creates a text-based progress bar like: `[████████░░] 80.0%`
#[must_use]
pub fn format_progress_bar(progress_percent: f64, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let clamped_progress = progress_percent.clamp(0.0, 100.0);

    // Cast safety: clamped_progress ∈ [0, 100], length is small (10-20).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((clamped_progress / 100.0) * length as f64).round() as usize;
    let empty = length.saturating_sub(filled);

    format!(
        "[{}{}] {progress_percent:.1}%",
        "█".repeat(filled),
        "░".repeat(empty)
    )
}

/// Formats minor units as pounds sterling, e.g. `123456` as `"£1,234.56"`.
#[must_use]
pub fn format_currency(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    let pounds = (abs / 100).to_string();
    let pence = abs % 100;

    let mut grouped = String::with_capacity(pounds.len() + pounds.len() / 3);
    for (i, digit) in pounds.chars().enumerate() {
        if i > 0 && (pounds.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}£{grouped}.{pence:02}")
}

/// Parses a currency string into minor units.
///
/// Symbols, separators and whitespace are ignored; at most two decimal places are
/// accepted.
///
/// # Errors
/// Returns [`Error::InvalidCurrency`] if no valid amount remains after stripping, or the
/// amount does not fit in an `i64`.
pub fn parse_currency(value: &str) -> Result<i64> {
    let invalid = || Error::InvalidCurrency {
        value: value.to_string(),
    };

    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let (negative, unsigned) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty())
        || fraction.len() > 2
        || !digits_only(whole)
        || !digits_only(fraction)
    {
        return Err(invalid());
    }

    let pounds: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let pence: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };

    let minor = pounds
        .checked_mul(100)
        .and_then(|p| p.checked_add(pence))
        .ok_or_else(invalid)?;
    Ok(if negative { -minor } else { minor })
}
