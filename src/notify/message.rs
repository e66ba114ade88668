use super::{
    Embed, EmbedField, EmbedFooter, WebhookPayload, COLOR_FAILURE, COLOR_INFO, COLOR_MIXED,
    COLOR_SUCCESS,
};
use crate::models::{BatchResult, ExecutionDetails, Frequency};
use crate::schedule::TradingCalendar;
use chrono::DateTime;
use chrono_tz::Tz;

const FOOTER: &str = "Recurring Orders System";
const UPCOMING_LIMIT: usize = 3;
const ERROR_PREVIEW_CHARS: usize = 50;
const LEDGER_ERROR_PREVIEW_CHARS: usize = 1000;

/// Build the single summary message for a batch run
pub fn batch_payload(
    result: &BatchResult,
    calendar: &TradingCalendar,
    username: &str,
    display_limit: usize,
) -> WebhookPayload {
    let embed = if let Some(error) = &result.ledger_error {
        ledger_error_embed(result, error)
    } else if result.details.is_empty() {
        nothing_due_embed(result, calendar)
    } else {
        execution_embed(result, calendar, display_limit)
    };

    WebhookPayload {
        username: username.to_string(),
        embeds: vec![embed],
    }
}

pub fn simple_payload(message: &str, is_error: bool, username: &str, now: DateTime<Tz>) -> WebhookPayload {
    let (title, color) = if is_error {
        ("❌ System Error", COLOR_FAILURE)
    } else {
        ("📊 System Notification", COLOR_INFO)
    };

    WebhookPayload {
        username: username.to_string(),
        embeds: vec![Embed {
            title: title.to_string(),
            description: Some(message.to_string()),
            color,
            timestamp: now.to_rfc3339(),
            fields: vec![],
            footer: footer(),
        }],
    }
}

/// Next due date of each skipped order, capped with an "... and N more" line
pub fn upcoming_lines(result: &BatchResult, calendar: &TradingCalendar) -> Vec<String> {
    let today = result.started_at.date_naive();
    let upcoming: Vec<String> = result
        .skipped
        .iter()
        .filter(|o| !matches!(o.frequency, Frequency::Unrecognized(_)))
        .filter_map(|o| {
            calendar.next_due_date(&o.frequency, today).map(|date| {
                format!(
                    "📅 **{}** ({} shares, {}) - {}",
                    o.symbol,
                    o.quantity,
                    o.frequency,
                    date.format("%A, %B %d")
                )
            })
        })
        .collect();

    let extra = upcoming.len().saturating_sub(UPCOMING_LIMIT);
    let mut lines: Vec<String> = upcoming.into_iter().take(UPCOMING_LIMIT).collect();
    if extra > 0 {
        lines.push(format!("... and {} more", extra));
    }
    lines
}

fn ledger_error_embed(result: &BatchResult, error: &str) -> Embed {
    Embed {
        title: "❌ Recurring Order Check Failed".to_string(),
        description: Some(format!(
            "💥 Could not read the order ledger, no orders were placed.\n{}",
            preview(error, LEDGER_ERROR_PREVIEW_CHARS)
        )),
        color: COLOR_FAILURE,
        timestamp: result.started_at.to_rfc3339(),
        fields: vec![execution_time_field(result)],
        footer: footer(),
    }
}

fn nothing_due_embed(result: &BatchResult, calendar: &TradingCalendar) -> Embed {
    let mut lines = vec![
        format!(
            "📊 **Daily Check Complete** - {}",
            result.started_at.format("%A, %B %d, %Y")
        ),
        format!("🔍 Checked {} active recurring orders", result.considered),
        "✅ No orders scheduled for today".to_string(),
    ];
    if let Some(next) = result.next_check {
        lines.push(format!("⏰ Next check: {}", next.format("%A %I:%M %p %Z")));
    }

    let upcoming = upcoming_lines(result, calendar);
    if !upcoming.is_empty() {
        lines.push("📋 **Upcoming Orders:**".to_string());
        lines.extend(upcoming);
    }

    Embed {
        title: "📊 Trading System Status".to_string(),
        description: Some(lines.join("\n")),
        color: COLOR_INFO,
        timestamp: result.started_at.to_rfc3339(),
        fields: vec![],
        footer: footer(),
    }
}

fn execution_embed(result: &BatchResult, calendar: &TradingCalendar, display_limit: usize) -> Embed {
    let successes = result.succeeded();
    let failures = result.failed();

    let (title, color) = match (successes, failures) {
        (_, 0) => ("🚀 Trading Orders Executed Successfully", COLOR_SUCCESS),
        (0, _) => ("❌ Trading Order Execution Failed", COLOR_FAILURE),
        _ => ("⚠️ Trading Orders Executed (Mixed Results)", COLOR_MIXED),
    };

    let mut fields = vec![EmbedField {
        name: "📊 Execution Summary".to_string(),
        value: format!(
            "**Considered:** {}\n**Executed:** {}\n**Successful:** {}\n**Failed:** {}",
            result.considered,
            result.executed(),
            successes,
            failures
        ),
        inline: true,
    }];

    let invested = result.total_estimated_cost();
    if invested > 0.0 {
        fields.push(EmbedField {
            name: "💰 Total Investment".to_string(),
            value: format!("${:.2}", invested),
            inline: true,
        });
    }

    let lines: Vec<String> = result
        .details
        .iter()
        .take(display_limit)
        .map(order_line)
        .collect();
    fields.push(EmbedField {
        name: "📋 Order Details".to_string(),
        value: lines.join("\n\n"),
        inline: false,
    });

    if result.details.len() > display_limit {
        fields.push(EmbedField {
            name: "➕ Additional Orders".to_string(),
            value: format!("... and {} more orders", result.details.len() - display_limit),
            inline: false,
        });
    }

    let upcoming = upcoming_lines(result, calendar);
    if !upcoming.is_empty() {
        fields.push(EmbedField {
            name: "📅 Upcoming Orders".to_string(),
            value: upcoming.join("\n"),
            inline: false,
        });
    }

    fields.push(execution_time_field(result));

    Embed {
        title: title.to_string(),
        description: None,
        color,
        timestamp: result.started_at.to_rfc3339(),
        fields,
        footer: footer(),
    }
}

fn order_line(detail: &ExecutionDetails) -> String {
    if detail.is_success() {
        let mut line = format!("🟢 **{}**: {} shares", detail.symbol, detail.target_quantity);
        if let Some(price) = detail.market_price {
            line.push_str(&format!(" @ ${:.2}", price));
        }
        if let Some(cost) = detail.estimated_cost {
            line.push_str(&format!(" (${:.2})", cost));
        }
        if let Some(id) = &detail.order_id {
            line.push_str(&format!("\n   📋 Order ID: `{}`", id));
        }
        line
    } else {
        let error = detail.error.as_deref().unwrap_or("Unknown error");
        format!(
            "🔴 **{}**: Failed - {}",
            detail.symbol,
            preview(error, ERROR_PREVIEW_CHARS)
        )
    }
}

/// First `max` characters, with "..." when anything was cut
fn preview(text: &str, max: usize) -> String {
    let mut cut: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        cut.push_str("...");
    }
    cut
}

fn execution_time_field(result: &BatchResult) -> EmbedField {
    EmbedField {
        name: "🕐 Execution Time".to_string(),
        value: format!(
            "{} ({})",
            result.started_at.format("%A, %B %d, %Y at %I:%M %p %Z"),
            result.trigger
        ),
        inline: true,
    }
}

fn footer() -> EmbedFooter {
    EmbedFooter {
        text: FOOTER.to_string(),
    }
}
