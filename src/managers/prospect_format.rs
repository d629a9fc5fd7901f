use serde_json::Value;
use std::fmt::Write;

use super::format_timestamp;
use crate::services::lawmatics::models::Prospect;

/// What is known about the prospect's stage when rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageLabel {
    None,
    Named { name: String, color: String },
    Unavailable { id: String },
}

const SINGLE_RELATIONS: &[(&str, &str, bool)] = &[
    ("created_by", "Created By", true),
    ("contact", "Contact", true),
    ("company", "Company", true),
    ("source", "Source", false),
    ("campaign", "Campaign", false),
    ("practice_area", "Practice Area", false),
    ("owned_by", "Owned By", true),
];

const MANY_RELATIONS: &[(&str, &str, &str)] = &[
    ("emails", "Email Addresses", "Email"),
    ("phone_numbers", "Phone Numbers", "Phone"),
    ("assigned_staff", "Assigned Staff", "Staff"),
];

const PEOPLE_RELATIONS: &[(&str, &str)] = &[
    ("lead_attorney", "Lead Attorney"),
    ("originating_attorney", "Originating Attorney"),
    ("salesperson", "Salesperson"),
];

const COUNTED_RELATIONS: &[(&str, &str)] = &[
    ("files", "Files"),
    ("documents", "Documents"),
    ("folders", "Folders"),
    ("events", "Events"),
    ("tasks", "Tasks"),
    ("notes", "Notes"),
    ("addresses", "Addresses"),
    ("invoices", "Invoices"),
    ("tags", "Tags"),
    ("file_requests", "File Requests"),
];

const DETAILED_RELATIONS: &[(&str, &str, &str)] = &[
    ("tasks", "Tasks", "Task"),
    ("files", "Files", "File"),
    ("documents", "Documents", "Document"),
];

fn dollars(cents: f64) -> String {
    format!("${:.2}", cents / 100.0)
}

fn contact_block(p: &Prospect) -> String {
    let suffix = p
        .attr_text("name_suffix")
        .map(|s| format!(" {}", s))
        .unwrap_or_default();
    format!(
        "Contact Name: {} {}{}\nEmail: {}\nPhone: {}",
        p.attr_text("first_name").unwrap_or_default(),
        p.attr_text("last_name").unwrap_or_default(),
        suffix,
        p.attr_text("email")
            .or_else(|| p.attr_text("email_address"))
            .unwrap_or_else(|| "[Not set]".to_string()),
        p.attr_text("phone")
            .or_else(|| p.attr_text("phone_number"))
            .unwrap_or_else(|| "[Not set]".to_string()),
    )
}

fn case_block(p: &Prospect) -> String {
    let mut out = String::new();
    if let Some(title) = p.attr_text("case_title") {
        let _ = write!(out, "\nCase Title: {}", title);
    }
    if let Some(blurb) = p.attr_text("case_blurb") {
        let _ = write!(out, "\nCase Description: {}", blurb);
    }
    if let Some(number) = p.attr_text("case_number") {
        let _ = write!(out, "\nCase Number: #{}", number);
    }
    let status = p.attr_text("status");
    let sub_status = p.attr_text("sub_status");
    if status.is_some() || sub_status.is_some() {
        let _ = write!(
            out,
            "\nStatus: {} {}",
            status.unwrap_or_default(),
            sub_status.map(|s| format!("({})", s)).unwrap_or_default()
        );
    }
    out
}

fn stage_block(stage: &StageLabel) -> String {
    match stage {
        StageLabel::None => String::new(),
        StageLabel::Named { name, color } => format!("\nStage: {} (#{})", name, color),
        StageLabel::Unavailable { id } => format!("\nStage ID: {} (details not available)", id),
    }
}

fn address_block(p: &Prospect) -> String {
    if let Some(full) = p.attr_text("full_address") {
        return format!("\nAddress: {}", full);
    }
    let city = p.attr_text("city");
    let state = p.attr_text("state");
    let zip = p.attr_text("zipcode");
    if city.is_none() && state.is_none() && zip.is_none() {
        return String::new();
    }
    let street = [p.attr_text("street"), p.attr_text("street2")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    let locality = p.attr_text("city_state_zip").unwrap_or_else(|| {
        [city, state, zip]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ")
    });
    let country = p
        .attr_text("country")
        .map(|c| format!(", {}", c))
        .unwrap_or_default();
    format!("\nAddress: {}\n{}{}", street, locality, country)
}

fn dates_block(p: &Prospect) -> String {
    let mut out = format!(
        "Created: {}\nUpdated: {}",
        format_timestamp(p.attr_text("created_at").as_deref()),
        format_timestamp(p.attr_text("updated_at").as_deref()),
    );
    if let Some(last) = p.attr_text("date_of_last_contact") {
        let _ = write!(
            out,
            "\nLast Contact: {} ({} days ago)",
            format_timestamp(Some(&last)),
            p.attr_text("days_since_last_contact")
                .unwrap_or_else(|| "?".to_string())
        );
    }
    out
}

fn financial_block(p: &Prospect) -> String {
    let lines: Vec<String> = [
        ("estimated_value_cents", "Estimated Value"),
        ("actual_value_cents", "Actual Value"),
        ("lead_cost_cents", "Lead Cost"),
    ]
    .iter()
    .filter_map(|(key, label)| {
        p.attr_f64(key)
            .filter(|cents| *cents != 0.0)
            .map(|cents| format!("\n- {}: {}", label, dollars(cents)))
    })
    .collect();
    if lines.is_empty() {
        String::new()
    } else {
        format!("\nFinancial:{}", lines.concat())
    }
}

fn tracking_block(p: &Prospect) -> String {
    let triggers = ["utm_source", "utm_medium", "utm_campaign", "utm_term", "gclid"];
    if !triggers.iter().any(|key| p.attr_text(key).is_some()) {
        return String::new();
    }
    let mut out = "\nTracking:".to_string();
    for (key, label) in [
        ("utm_source", "UTM Source"),
        ("utm_medium", "UTM Medium"),
        ("utm_campaign", "UTM Campaign"),
        ("utm_term", "UTM Term"),
        ("gclid", "GCLID"),
        ("referring_url", "Referring URL"),
    ] {
        if let Some(value) = p.attr_text(key) {
            let _ = write!(out, "\n- {}: {}", label, value);
        }
    }
    out
}

fn custom_fields_block(p: &Prospect) -> String {
    let Some(Value::Array(fields)) = p.attr("custom_fields") else {
        return String::new();
    };
    if fields.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = fields
        .iter()
        .map(|field| {
            let name = field.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let value = ["formatted_value", "value"]
                .iter()
                .filter_map(|key| field.get(*key))
                .find_map(|v| match v {
                    Value::Null => None,
                    Value::String(s) if s.is_empty() => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .unwrap_or_else(|| "[Not set]".to_string());
            format!("- {}: {}", name, value)
        })
        .collect();
    format!("\nCustom Fields:\n{}", lines.join("\n"))
}

fn relationships_block(p: &Prospect) -> String {
    let mut out = "\nRelationships:".to_string();
    for (key, label, with_id_prefix) in SINGLE_RELATIONS {
        if let Some(rel) = p.relation_one(key) {
            let prefix = match (*with_id_prefix, *key) {
                (true, "created_by") => "User ID ",
                (true, _) => "ID ",
                _ => "",
            };
            let _ = write!(out, "\n- {}: {}{} ({})", label, prefix, rel.id, rel.kind);
        }
    }
    for (key, label, item) in MANY_RELATIONS {
        let items = p.relation_many(key);
        if items.is_empty() {
            continue;
        }
        let _ = write!(out, "\n- {} ({}):", label, items.len());
        for (idx, rel) in items.iter().enumerate() {
            let _ = write!(out, "\n  * {} {}: ID {} ({})", item, idx + 1, rel.id, rel.kind);
        }
    }
    for (key, label) in PEOPLE_RELATIONS {
        if let Some(rel) = p.relation_one(key) {
            let _ = write!(out, "\n- {}: {} ({})", label, rel.id, rel.kind);
        }
    }

    out.push_str("\n\nRelated Items:");
    for (key, label) in COUNTED_RELATIONS {
        let _ = write!(out, "\n  - {}: {}", label, p.relation_many(key).len());
    }

    for (key, label, item) in DETAILED_RELATIONS {
        let items = p.relation_many(key);
        if items.is_empty() {
            continue;
        }
        let _ = write!(out, "\n\n{} ({}):", label, items.len());
        for (idx, rel) in items.iter().enumerate() {
            let _ = write!(out, "\n  {}. {} ID: {} ({})", idx + 1, item, rel.id, rel.kind);
        }
    }
    out
}

fn notes_block(p: &Prospect) -> String {
    let notes = p.relation_many("notes");
    if notes.is_empty() {
        return String::new();
    }
    let mut out = format!(
        "\nRelated Notes:\n- {} note(s) attached to this prospect",
        notes.len()
    );
    for (idx, note) in notes.iter().enumerate() {
        let _ = write!(out, "\n  {}. Note ID: {} (Type: {})", idx + 1, note.id, note.kind);
    }
    out
}

/// Full human-readable rendering of one matter / prospect, followed by its raw JSON.
pub fn format_prospect_details(prospect: &Prospect, stage: &StageLabel) -> String {
    let id = if prospect.id.is_empty() {
        "[Unknown matter / prospect ID]"
    } else {
        prospect.id.as_str()
    };
    let raw = serde_json::to_string_pretty(prospect).unwrap_or_default();
    format!(
        "Matter / Prospect ID: {}\n\n{}{}{}{}\n\n{}{}{}{}\n{}{}\n\nraw data:\n{}",
        id,
        contact_block(prospect),
        case_block(prospect),
        stage_block(stage),
        address_block(prospect),
        dates_block(prospect),
        financial_block(prospect),
        tracking_block(prospect),
        custom_fields_block(prospect),
        relationships_block(prospect),
        notes_block(prospect),
        raw
    )
}

/// `- <id>: First Last (email)` per prospect.
pub fn format_prospect_list(prospects: &[Prospect]) -> String {
    prospects
        .iter()
        .map(|p| {
            format!(
                "- {}: {} {} ({})",
                p.id,
                p.attr_text("first_name").unwrap_or_default(),
                p.attr_text("last_name").unwrap_or_default(),
                p.attr_text("email_address")
                    .or_else(|| p.attr_text("email"))
                    .unwrap_or_else(|| "No email".to_string())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
