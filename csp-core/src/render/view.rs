use super::html::{write_head, write_tail, Escaped};
use crate::domain::RootDomain;
use crate::error::{CspError, Result};
use crate::report::ViolationRecord;
use std::fmt::{self, Write};

/// Render the report page for one domain
///
/// Fails as a whole if any record's blocked URI cannot be parsed; no partial
/// page is produced.
pub fn render_view(domain: &RootDomain, ledger: &[ViolationRecord]) -> Result<String> {
    let mut hosts = Vec::with_capacity(ledger.len());
    for (index, record) in ledger.iter().enumerate() {
        let host = record.blocked_host().map_err(|e| CspError::Render {
            domain: domain.to_string(),
            reason: format!("record {}: invalid blocked-uri: {}", index, e),
        })?;
        hosts.push(host);
    }

    let mut out = String::new();
    write_view(&mut out, domain, ledger, &hosts).map_err(|e| CspError::Render {
        domain: domain.to_string(),
        reason: e.to_string(),
    })?;
    Ok(out)
}

fn write_view(
    out: &mut String,
    domain: &RootDomain,
    ledger: &[ViolationRecord],
    hosts: &[String],
) -> fmt::Result {
    let title = format!("CSP Reports for {}", domain);
    write_head(out, &title)?;

    writeln!(out, "<div class=\"container\">")?;
    writeln!(out, "    <h1>{}</h1>", Escaped(&title))?;
    writeln!(out, "    <a href=\"index.html\"><div class=\"menu\">Back</div></a>")?;
    writeln!(out, "    <p class=\"summary\">{} report(s)</p>", ledger.len())?;

    for (record, host) in ledger.iter().zip(hosts) {
        // Keyword sources like 'inline' have no host; show the page instead.
        let label = if host.is_empty() { &record.document_uri } else { host };

        writeln!(out, "    <div class=\"report\">")?;
        writeln!(
            out,
            "    <button class=\"collapsible\"><b>{}</b>: Blocked Asset: {}</button>",
            Escaped(domain.as_str()),
            Escaped(label)
        )?;
        writeln!(out, "    <div class=\"content\">")?;
        write_field(out, "Document URI", &record.document_uri)?;
        write_field(out, "Referrer", &record.referrer)?;
        write_field(out, "Blocked URI", &record.blocked_uri)?;
        write_field(out, "Violated Directive", &record.violated_directive)?;
        write_field(
            out,
            "Effective Directive",
            record.effective_directive.as_deref().unwrap_or_default(),
        )?;
        if let Some(policy) = record.original_policy.as_deref() {
            write_field(out, "Original Policy", policy)?;
        }
        write_field(out, "Status Code", &record.status_code.to_string())?;
        write_field(out, "Source File", &record.source_file)?;
        write_field(out, "Line Number", &record.line_number.to_string())?;
        write_field(out, "Column Number", &record.column_number.to_string())?;
        if let Some(received) = record.received_at {
            write_field(
                out,
                "Received",
                &received.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            )?;
        }
        writeln!(out, "    </div>")?;
        writeln!(out, "    </div>")?;
    }

    writeln!(out, "</div>")?;
    write_tail(out)
}

fn write_field(out: &mut String, label: &str, value: &str) -> fmt::Result {
    writeln!(
        out,
        "        <p><strong>{}:</strong> {}</p>",
        label,
        Escaped(value)
    )
}
