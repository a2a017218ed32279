//! Command execution.

use crate::Commands;
use colored::Colorize;
use proglog_log::{LogError, LogRecord, Segment};

/// Executes a command against an open segment and returns the formatted output.
pub fn execute(segment: &Segment, cmd: Commands) -> Result<String, LogError> {
    match cmd {
        Commands::List => unreachable!(), // Needs no segment; handled by main

        Commands::Append { values } => {
            let mut lines = Vec::with_capacity(values.len());
            for value in values {
                let mut record = LogRecord::new(value.into_bytes());
                let offset = segment.append(&mut record)?;
                lines.push(format!("{} offset {}", "Appended".green(), offset));
            }
            if segment.is_maxed() {
                lines.push(format!(
                    "{}: segment {} is maxed; start a new segment at {}",
                    "Warning".yellow(),
                    segment.base_offset(),
                    segment.next_offset()
                ));
            }
            Ok(lines.join("\n"))
        }

        Commands::Read { offset } => {
            let record: LogRecord = segment.read(offset)?;
            Ok(format_record(&record))
        }

        Commands::Stat => {
            let config = segment.config();
            let maxed = if segment.is_maxed() {
                "yes".red().to_string()
            } else {
                "no".green().to_string()
            };
            Ok(format!(
                "{}\n  next offset: {}\n  records:     {}\n  store:       {} / {} bytes\n  index:       {} / {} bytes\n  maxed:       {}",
                format!("Segment {}", segment.base_offset()).bold(),
                segment.next_offset(),
                segment.len(),
                segment.store().size(),
                config.max_store_bytes,
                segment.index().size(),
                segment.index().capacity(),
                maxed
            ))
        }

        Commands::Dump => {
            if segment.is_empty() {
                return Ok("Segment is empty".yellow().to_string());
            }
            let lines = (segment.base_offset()..segment.next_offset())
                .map(|offset| segment.read::<LogRecord>(offset).map(|r| format_record(&r)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lines.join("\n"))
        }

        Commands::Remove => {
            let base_offset = segment.base_offset();
            segment.remove()?;
            Ok(format!("{} segment {}", "Removed".green(), base_offset))
        }
    }
}

/// Formats the base offsets found in a directory.
pub fn format_list(offsets: &[u64]) -> String {
    if offsets.is_empty() {
        return "No segments found".yellow().to_string();
    }
    offsets
        .iter()
        .map(|offset| offset.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_record(record: &LogRecord) -> String {
    serde_json::json!({
        "offset": record.offset,
        "value": String::from_utf8_lossy(&record.value),
    })
    .to_string()
}
