use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_store::{PurgeFilter, Store};

mod enroll;
mod paths;

use paths::Paths;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attendance records, most recent first
    Records,
    /// List enrolled contacts
    Contacts,
    /// Add or update a contact
    AddContact {
        /// Student's full name
        name: String,
        /// Guardian phone, + followed by 10-15 digits
        #[arg(short, long)]
        phone: String,
        /// Notification email address
        #[arg(short, long)]
        email: String,
    },
    /// Remove a contact
    RemoveContact {
        name: String,
    },
    /// List absentees for a date and set of hours
    Absentees {
        /// Date, YYYY-MM-DD
        #[arg(short, long)]
        date: NaiveDate,
        /// Hours to check, e.g. 9,10,11
        #[arg(long, value_delimiter = ',')]
        hours: Vec<u32>,
    },
    /// Per-student attendance percentages
    Stats,
    /// Delete attendance records
    Purge {
        /// Delete records for this student only
        #[arg(long)]
        name: Option<String>,
        /// Delete records for this date only, YYYY-MM-DD
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Delete every attendance record
        #[arg(long, conflicts_with_all = ["name", "date"])]
        all: bool,
    },
    /// Capture face samples from the camera and enroll a student
    Enroll {
        /// Student's full name
        name: String,
        /// Guardian phone, + followed by 10-15 digits
        #[arg(short, long)]
        phone: String,
        /// Notification email address
        #[arg(short, long)]
        email: String,
        /// Number of face samples to capture
        #[arg(short, long, default_value_t = 5)]
        samples: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let paths = Paths::from_env();

    match cli.command {
        Commands::Records => {
            let store = Store::open(&paths.db_path)?;
            let records = store.records()?;
            if records.is_empty() {
                println!("No attendance records");
                return Ok(());
            }
            for record in records {
                println!("{}  {:>2}:00  {}", record.date, record.hour, record.name);
            }
        }
        Commands::Contacts => {
            let store = Store::open(&paths.db_path)?;
            let contacts = store.contacts()?;
            if contacts.is_empty() {
                println!("No contacts");
                return Ok(());
            }
            for contact in contacts {
                println!(
                    "{}  phone={}  email={}",
                    contact.name,
                    contact.phone.as_deref().unwrap_or("-"),
                    contact.email.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::AddContact { name, phone, email } => {
            let name = validated_name(&name)?;
            validate_contact_fields(&phone, &email)?;
            let store = Store::open(&paths.db_path)?;
            store.upsert_contact(&name, Some(&phone), Some(&email))?;
            println!("Contact saved for {name}");
        }
        Commands::RemoveContact { name } => {
            let store = Store::open(&paths.db_path)?;
            if store.delete_contact(name.trim())? {
                println!("Contact removed: {}", name.trim());
            } else {
                println!("No contact named {}", name.trim());
            }
        }
        Commands::Absentees { date, hours } => {
            if hours.is_empty() {
                bail!("--hours requires at least one hour");
            }
            if let Some(bad) = hours.iter().find(|&&h| h > 23) {
                bail!("hour {bad} is out of range 0-23");
            }
            let store = Store::open(&paths.db_path)?;
            let absences = store.absentees(date, &hours)?;
            if absences.is_empty() {
                println!("No absentees for {date}");
                return Ok(());
            }
            for (hour, name) in absences {
                println!("{hour:>2}:00  {name}");
            }
        }
        Commands::Stats => {
            let store = Store::open(&paths.db_path)?;
            let (stats, total) = store.stats()?;
            println!("Sessions observed: {total}");
            for stat in stats {
                println!(
                    "{:<30} present {:>3}  {:>6.2}%",
                    stat.name, stat.present, stat.percentage
                );
            }
        }
        Commands::Purge { name, date, all } => {
            let filter = match (name, date, all) {
                (_, _, true) => PurgeFilter::All,
                (Some(name), Some(date), false) => PurgeFilter::ByNameAndDate { name, date },
                (Some(name), None, false) => PurgeFilter::ByName(name),
                (None, Some(date), false) => PurgeFilter::ByDate(date),
                (None, None, false) => {
                    bail!("refusing to purge without a filter; pass --name, --date, or --all")
                }
            };
            let store = Store::open(&paths.db_path)?;
            let deleted = store.purge(filter)?;
            println!("Deleted {deleted} attendance record(s)");
        }
        Commands::Enroll {
            name,
            phone,
            email,
            samples,
        } => {
            let name = validated_name(&name)?;
            validate_contact_fields(&phone, &email)?;
            if samples == 0 {
                bail!("--samples must be at least 1");
            }
            enroll::run(&paths, &name, &phone, &email, samples)?;
        }
    }

    Ok(())
}

fn validated_name(name: &str) -> Result<String> {
    let name = name.trim();
    let chars = name.chars().count();
    if !(2..=50).contains(&chars) {
        bail!("name must be 2-50 characters, got {chars}");
    }
    Ok(name.to_string())
}

fn validate_contact_fields(phone: &str, email: &str) -> Result<()> {
    if !rollcall_store::validate::valid_phone(phone) {
        bail!("phone must be + followed by 10-15 digits (e.g. +919876543210)");
    }
    if !rollcall_store::validate::valid_email(email) {
        bail!("invalid email address (expected local@domain form)");
    }
    Ok(())
}
