//! Terminal rendering of core results.

use anyhow::Result;
use serde_json::json;
use wooledger_core::{
    ArchiveStats, AuditEntry, ChainVerification, DisclosurePackage, DisclosureRequest,
    ExportSummary, MessageRecord, RECENT_DAYS, RequestSummary, SearchHit,
};

/// Prints ranked search hits.
pub fn search_hits(hits: &[SearchHit], as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No matching messages.");
        return Ok(());
    }
    for hit in hits {
        let record = &hit.record;
        println!(
            "{:>5.2}  {}  {}  {:<12}  {}",
            hit.score,
            record.sent_at.format("%Y-%m-%d %H:%M"),
            record.id.short(),
            record.tier.dutch_label(),
            record.subject
        );
    }
    println!("{} result(s)", hits.len());
    Ok(())
}

/// Prints the metadata of one message.
pub fn message(record: &MessageRecord, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }
    let from = record.sender.name.as_ref().map_or_else(
        || record.sender.email.clone(),
        |name| format!("{name} <{}>", record.sender.email),
    );
    println!("Message:      {}", record.id);
    println!("From:         {from}");
    for to in &record.recipients {
        println!("To:           {to}");
    }
    println!("Subject:      {}", record.subject);
    println!("Sent:         {}", record.sent_at.format("%Y-%m-%d %H:%M"));
    println!("Tier:         {}", record.tier.dutch_label());
    if record.confidential {
        println!("Marked:       confidential");
    }
    if let Some(case) = &record.case_id {
        println!("Case:         {case}");
    }
    println!("Attachments:  {}", record.attachment_count);
    println!("Size:         {} bytes", record.size_bytes);
    Ok(())
}

/// Prints archive statistics.
pub fn stats(stats: &ArchiveStats, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    println!("Messages:      {}", stats.total_messages);
    println!(
        "{:<15}{}",
        format!("Last {RECENT_DAYS} days:"),
        stats.recent_messages
    );
    println!("Confidential:  {}", stats.confidential_messages);
    println!("Case-linked:   {}", stats.case_linked_messages);
    println!("Total size:    {} bytes", stats.total_bytes);
    Ok(())
}

/// Prints one request in detail.
pub fn request(request: &DisclosureRequest) {
    println!("Request:    {}", request.id);
    println!("State:      {}", request.state);
    println!("Query:      {}", request.query);
    println!("Requester:  {}", request.requester.name);
    if let Some(email) = &request.requester.email {
        println!("Email:      {email}");
    }
    println!("Filed:      {}", request.request_date);
    println!("Due:        {}", request.due_date);
    if let Some(reason) = &request.rejection_reason {
        println!("Reason:     {reason}");
    }
}

/// Prints the request list.
pub fn requests(summaries: &[RequestSummary], as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
        return Ok(());
    }
    let today = chrono::Utc::now().date_naive();
    for RequestSummary { request, matched } in summaries {
        let overdue = if request.is_overdue(today) { "  OVERDUE" } else { "" };
        println!(
            "{:<18}  {:<10}  due {}  {matched:>4} matched  {}{overdue}",
            request.id.as_str(),
            request.state.as_str(),
            request.due_date,
            request.query
        );
    }
    Ok(())
}

/// Prints a disclosure package.
pub fn package(package: &DisclosurePackage, as_json: bool) -> Result<()> {
    if as_json {
        let items: Vec<_> = package
            .items
            .iter()
            .map(|item| {
                json!({
                    "message_id": item.message_id,
                    "decision": item.decision.as_str(),
                    "reason": item.decision.reason().map(|r| r.as_str()),
                    "score": item.score,
                })
            })
            .collect();
        let doc = json!({
            "request_id": package.request_id,
            "disclosed": package.disclosed_count(),
            "withheld": package.withheld_count(),
            "items": items,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!(
        "Package for {}: {} disclosed, {} withheld",
        package.request_id,
        package.disclosed_count(),
        package.withheld_count()
    );
    for item in &package.items {
        let reason = item
            .decision
            .reason()
            .map(|r| format!(" ({r})"))
            .unwrap_or_default();
        println!(
            "  {:>5.2}  {}  {}{reason}",
            item.score,
            item.message_id.short(),
            item.decision.as_str()
        );
    }
    Ok(())
}

/// Prints audit entries, oldest first.
pub fn audit_entries(entries: &[AuditEntry], as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    for entry in entries {
        let request = entry
            .request_id
            .as_ref()
            .map_or("-", |id| id.as_str());
        println!(
            "#{:<5} {}  {:<18} {:<10} {:<18} disclosed={} withheld={}",
            entry.sequence,
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action.as_str(),
            entry.actor,
            request,
            entry.disclosed_count,
            entry.withheld_count
        );
    }
    Ok(())
}

/// Prints the result of a chain verification.
pub fn verification(verification: &ChainVerification) {
    if verification.valid {
        println!(
            "Audit chain intact: {} entries verified",
            verification.verified_entries
        );
    } else {
        println!(
            "Audit chain BROKEN at sequence {}: {}",
            verification
                .first_invalid_sequence
                .map_or_else(|| "?".to_string(), |s| s.to_string()),
            verification.error.as_deref().unwrap_or("unknown error")
        );
        println!(
            "{} of {} entries verified",
            verification.verified_entries, verification.total_entries
        );
    }
}

/// Prints an export summary.
pub fn export(summary: &ExportSummary) {
    println!("Wrote {} message(s)", summary.written);
    if summary.missing > 0 {
        println!("{} disclosed message(s) missing from the archive", summary.missing);
    }
    println!("Manifest: {}", summary.manifest.display());
}
