//! Periodic absence reports.
//!
//! Each recipient (a teacher, typically) has a set of assigned hours and
//! a daily report time. A scheduler task per recipient sleeps until the
//! next local occurrence of that time, then builds and dispatches an
//! absence summary with a CSV export, reusing the store's absentee query.
//! Each firing is fire-and-forget: delivery failure is logged and the
//! task simply waits for the next day.

use crate::notify::{Attachment, MailTransport, Message};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_store::Store;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One `[[recipient]]` entry in the recipients TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRecipient {
    pub name: String,
    pub email: String,
    /// Hours (0–23) this recipient is responsible for.
    pub hours: Vec<u32>,
    /// Daily report time, "HH:MM" local.
    pub report_time: String,
}

#[derive(Debug, Deserialize)]
struct RecipientsFile {
    #[serde(default)]
    recipient: Vec<ReportRecipient>,
}

/// Load report recipients. A missing file means reports are simply not
/// configured; that is not an error.
pub fn load_recipients(path: &Path) -> anyhow::Result<Vec<ReportRecipient>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no recipients file, reports disabled");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    let file: RecipientsFile = toml::from_str(&data)?;
    tracing::info!(
        path = %path.display(),
        recipients = file.recipient.len(),
        "report recipients loaded"
    );
    Ok(file.recipient)
}

/// Spawn one scheduler task per recipient. Runs until process exit.
pub fn spawn_schedulers(
    recipients: Vec<ReportRecipient>,
    db_path: PathBuf,
    transport: Arc<dyn MailTransport>,
) {
    for recipient in recipients {
        let Some(fire_at) = parse_report_time(&recipient.report_time) else {
            tracing::error!(
                name = %recipient.name,
                report_time = %recipient.report_time,
                "unparseable report time, recipient skipped"
            );
            continue;
        };

        let db_path = db_path.clone();
        let transport = transport.clone();
        tokio::spawn(async move {
            loop {
                let wait = time_until_next(Local::now().naive_local(), fire_at);
                tracing::debug!(
                    name = %recipient.name,
                    minutes = wait.num_minutes(),
                    "next report scheduled"
                );
                tokio::time::sleep(wait.to_std().unwrap_or_default()).await;

                let recipient = recipient.clone();
                let db_path = db_path.clone();
                let transport = transport.clone();
                let _ = tokio::task::spawn_blocking(move || {
                    match Store::open(&db_path) {
                        Ok(store) => send_report(
                            &store,
                            &recipient,
                            Local::now().date_naive(),
                            transport.as_ref(),
                        ),
                        Err(e) => {
                            tracing::error!(error = %e, "report store open failed")
                        }
                    }
                })
                .await;
            }
        });
    }
}

/// Build and dispatch one absence report. Best-effort: all failures are
/// logged, none propagate.
pub fn send_report(
    store: &Store,
    recipient: &ReportRecipient,
    date: NaiveDate,
    transport: &dyn MailTransport,
) {
    let mut hours = recipient.hours.clone();
    hours.sort_unstable();

    let absences = match store.absentees(date, &hours) {
        Ok(absences) => absences,
        Err(e) => {
            tracing::error!(name = %recipient.name, error = %e, "absentee query failed");
            return;
        }
    };

    let message = absence_report(recipient, date, &absences);
    match transport.send(&message) {
        Ok(()) => tracing::info!(
            to = %recipient.email,
            %date,
            absences = absences.len(),
            "absence report sent"
        ),
        Err(e) => tracing::warn!(to = %recipient.email, error = %e, "report delivery failed"),
    }
}

fn absence_report(
    recipient: &ReportRecipient,
    date: NaiveDate,
    absences: &[(u32, String)],
) -> Message {
    let hours_list = recipient
        .hours
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let body = format!(
        "Dear {},\n\n\
         Please find attached the attendance report for your assigned hours ({hours_list}).\n\n\
         Summary for {date}:\n\
         - Absences recorded: {}\n\n\
         The attached CSV file lists every absent student per hour.\n\n\
         Best regards,\n\
         Rollcall Attendance System\n",
        recipient.name,
        absences.len(),
    );

    Message {
        to: recipient.email.clone(),
        subject: format!("Daily Attendance Report - {date}"),
        body,
        attachments: vec![Attachment {
            filename: format!("attendance_report_{date}.csv"),
            content_type: "text/csv".to_string(),
            data: absences_csv(absences).into_bytes(),
        }],
    }
}

/// Render absences as CSV rows of (hour, student, status).
fn absences_csv(absences: &[(u32, String)]) -> String {
    let mut csv = String::from("Hour,Student,Status\n");
    for (hour, student) in absences {
        csv.push_str(&format!("{hour},{},Absent\n", csv_field(student)));
    }
    csv
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn parse_report_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Duration from `now` until the next occurrence of `at`, rolling to
/// tomorrow when today's slot has already passed.
fn time_until_next(now: NaiveDateTime, at: NaiveTime) -> chrono::Duration {
    let today = now.date().and_time(at);
    if today > now {
        today - now
    } else {
        today + chrono::Duration::days(1) - now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(hours: Vec<u32>) -> ReportRecipient {
        ReportRecipient {
            name: "Ms. Smith".into(),
            email: "smith@school.example".into(),
            hours,
            report_time: "16:30".into(),
        }
    }

    #[test]
    fn test_parse_report_time() {
        assert_eq!(
            parse_report_time("16:30"),
            Some(NaiveTime::from_hms_opt(16, 30, 0).unwrap())
        );
        assert!(parse_report_time("25:00").is_none());
        assert!(parse_report_time("four thirty").is_none());
    }

    #[test]
    fn test_time_until_next_later_today() {
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let at = NaiveTime::from_hms_opt(16, 30, 0).unwrap();
        assert_eq!(time_until_next(now, at), chrono::Duration::minutes(390));
    }

    #[test]
    fn test_time_until_next_rolls_to_tomorrow() {
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(17, 0, 0)
            .unwrap();
        let at = NaiveTime::from_hms_opt(16, 30, 0).unwrap();
        assert_eq!(
            time_until_next(now, at),
            chrono::Duration::hours(23) + chrono::Duration::minutes(30)
        );
    }

    #[test]
    fn test_time_until_next_exact_moment_waits_a_day() {
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(16, 30, 0)
            .unwrap();
        let at = NaiveTime::from_hms_opt(16, 30, 0).unwrap();
        assert_eq!(time_until_next(now, at), chrono::Duration::days(1));
    }

    #[test]
    fn test_absences_csv_layout() {
        let absences = vec![(9, "Bob".to_string()), (10, "Alice".to_string())];
        let csv = absences_csv(&absences);
        assert_eq!(csv, "Hour,Student,Status\n9,Bob,Absent\n10,Alice,Absent\n");
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("Plain Name"), "Plain Name");
        assert_eq!(csv_field("Last, First"), "\"Last, First\"");
        assert_eq!(csv_field("Says \"hi\""), "\"Says \"\"hi\"\"\"");
    }

    #[test]
    fn test_absence_report_message() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let absences = vec![(9, "Bob".to_string())];
        let message = absence_report(&recipient(vec![9, 10]), date, &absences);

        assert_eq!(message.to, "smith@school.example");
        assert!(message.subject.contains("2024-01-01"));
        assert!(message.body.contains("9, 10"));
        assert!(message.body.contains("Absences recorded: 1"));
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].content_type, "text/csv");
        let csv = String::from_utf8(message.attachments[0].data.clone()).unwrap();
        assert!(csv.contains("9,Bob,Absent"));
    }

    #[test]
    fn test_send_report_queries_absentees() {
        use crate::notify::tests::RecordingTransport;

        let store = Store::open_in_memory().unwrap();
        store.upsert_contact("Alice", None, None).unwrap();
        store.upsert_contact("Bob", None, None).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        store.mark("Alice", date, 9).unwrap();

        let transport = RecordingTransport::new(false);
        send_report(&store, &recipient(vec![9]), date, transport.as_ref());

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let csv = String::from_utf8(sent[0].attachments[0].data.clone()).unwrap();
        assert!(csv.contains("9,Bob,Absent"));
        assert!(!csv.contains("Alice"));
    }

    #[test]
    fn test_send_report_swallows_delivery_failure() {
        use crate::notify::tests::RecordingTransport;

        let store = Store::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let transport = RecordingTransport::new(true);
        // Must not panic.
        send_report(&store, &recipient(vec![9]), date, transport.as_ref());
    }

    #[test]
    fn test_load_recipients_missing_file_is_empty() {
        let recipients = load_recipients(Path::new("/nonexistent/recipients.toml")).unwrap();
        assert!(recipients.is_empty());
    }

    #[test]
    fn test_load_recipients_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipients.toml");
        std::fs::write(
            &path,
            r#"
[[recipient]]
name = "Ms. Smith"
email = "smith@school.example"
hours = [9, 10, 11]
report_time = "16:30"

[[recipient]]
name = "Mr. Jones"
email = "jones@school.example"
hours = [13]
report_time = "17:00"
"#,
        )
        .unwrap();

        let recipients = load_recipients(&path).unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].hours, vec![9, 10, 11]);
        assert_eq!(recipients[1].report_time, "17:00");
    }
}
