//! CLI command implementations

use crate::ExportFormat;
use anyhow::{Result, bail};
use bugtrack_core::bug::{parse_developer_id, parse_due_date};
use bugtrack_core::export::{self, pdf::PdfOptions};
use bugtrack_core::{
    Bug, BugChanges, BugService, Config, Developer, NewBug, NewDeveloper, NotificationOutcome,
    Priority, Status, Store, UNASSIGNED, notify,
};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Flags accepted by `bugtrack update`
#[derive(Debug, Default, clap::Args)]
pub struct UpdateArgs {
    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New description
    #[arg(short, long)]
    pub description: Option<String>,

    /// New status (open, in_progress, closed)
    #[arg(short, long)]
    pub status: Option<String>,

    /// New priority (low, medium, high)
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Developer ID to assign
    #[arg(long, conflicts_with = "unassign")]
    pub developer: Option<String>,

    /// Remove the current assignee
    #[arg(long)]
    pub unassign: bool,

    /// New due date (YYYY-MM-DD)
    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    /// Remove the due date
    #[arg(long)]
    pub clear_due: bool,
}

#[derive(Tabled)]
struct BugRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: Status,
    #[tabled(rename = "Priority")]
    priority: Priority,
    #[tabled(rename = "Assigned To")]
    assignee: String,
    #[tabled(rename = "Due")]
    due: String,
}

impl From<&Bug> for BugRow {
    fn from(bug: &Bug) -> Self {
        Self {
            id: bug.id,
            title: bug.title.clone(),
            status: bug.status,
            priority: bug.priority,
            assignee: bug.assignee_name().to_string(),
            due: bug.due_date.map(|d| d.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct DeveloperRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
}

impl From<&Developer> for DeveloperRow {
    fn from(dev: &Developer) -> Self {
        Self {
            id: dev.id,
            name: dev.name.clone(),
            email: dev.email.clone(),
        }
    }
}

fn load_config() -> Result<Config> {
    Config::load_default().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn open_service(config: &Config) -> Result<BugService> {
    let store = Store::open(&config.database.path)?;
    let notifier = notify::from_config(&config.smtp)?;
    Ok(BugService::new(Arc::new(store), Arc::from(notifier))
        .with_notifications(config.notifications.enabled))
}

fn service() -> Result<BugService> {
    open_service(&load_config()?)
}

fn status_colored(status: Status) -> colored::ColoredString {
    match status {
        Status::Open => status.as_str().white(),
        Status::InProgress => status.as_str().yellow(),
        Status::Closed => status.as_str().green(),
    }
}

fn priority_colored(priority: Priority) -> colored::ColoredString {
    match priority {
        Priority::Low => priority.as_str().dimmed(),
        Priority::Medium => priority.as_str().normal(),
        Priority::High => priority.as_str().red(),
    }
}

fn report_notification(outcome: &NotificationOutcome) {
    match outcome {
        NotificationOutcome::None => {}
        NotificationOutcome::Sent(kind) => {
            println!("  Notification: {} sent", kind.as_str());
        }
        NotificationOutcome::Failed(kind, reason) => {
            println!(
                "  {} {} notification failed: {}",
                "!".yellow(),
                kind.as_str(),
                reason
            );
        }
    }
}

pub fn init(force: bool) -> Result<()> {
    let path = Config::resolve_path();
    if path.exists() && !force {
        bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, Config::default_with_comments())?;

    let config = load_config()?;
    Store::open(&config.database.path)?;

    println!("{} Wrote config to {}", "✓".green(), path.display());
    println!("  Database: {}", config.database.path.display());
    Ok(())
}

pub fn list(status: Option<String>, json: bool) -> Result<()> {
    let mut bugs = service()?.list_bugs()?;

    if let Some(ref s) = status {
        let status: Status = s.parse()?;
        bugs.retain(|b| b.status == status);
    }

    if json {
        println!("{}", serde_json::to_string(&bugs)?);
    } else if bugs.is_empty() {
        println!("No bugs found");
    } else {
        let rows: Vec<BugRow> = bugs.iter().map(BugRow::from).collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
    }

    Ok(())
}

pub fn show(id: i64, json: bool) -> Result<()> {
    let bug = service()?.get_bug(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bug)?);
    } else {
        println!("{} {}", format!("#{}", bug.id).cyan().bold(), bug.title.bold());
        println!();
        println!("Status:   {}", status_colored(bug.status));
        println!("Priority: {}", priority_colored(bug.priority));
        match &bug.developer {
            Some(dev) => println!("Assigned: {} <{}>", dev.name, dev.email),
            None => println!("Assigned: {}", UNASSIGNED.dimmed()),
        }
        if let Some(due) = bug.due_date {
            println!("Due:      {}", due);
        }
        println!("Created:  {}", bug.created_at.format("%Y-%m-%d %H:%M"));

        if !bug.description.is_empty() {
            println!();
            println!("{}", "Description:".bold());
            println!("{}", bug.description);
        }
    }

    Ok(())
}

pub fn create(
    title: &str,
    description: &str,
    priority: &str,
    developer: Option<String>,
    due: Option<String>,
    json: bool,
) -> Result<()> {
    let mut new = NewBug::new(title, description);
    new.priority = priority.parse()?;
    if let Some(ref developer) = developer {
        new.developer_id = parse_developer_id(developer)?;
    }
    if let Some(ref due) = due {
        new.due_date = parse_due_date(due)?;
    }

    let bug = service()?.create_bug(&new)?;

    if json {
        println!("{}", serde_json::to_string(&bug)?);
    } else {
        println!("{} Created bug #{}", "✓".green(), bug.id);
        println!("  Title: {}", bug.title);
        println!("  Priority: {}", bug.priority);
        println!("  Assigned: {}", bug.assignee_name());
    }

    Ok(())
}

/// Apply command-line flags on top of the current state of `bug`
fn changes_from(bug: &Bug, args: UpdateArgs) -> Result<BugChanges> {
    let mut changes = BugChanges::keeping(bug);
    changes.title = args.title;
    changes.description = args.description;
    changes.status = args.status.as_deref().map(str::parse::<Status>).transpose()?;
    changes.priority = args.priority.as_deref().map(str::parse::<Priority>).transpose()?;

    if args.unassign {
        changes.developer_id = None;
    } else if let Some(ref developer) = args.developer {
        changes.developer_id = parse_developer_id(developer)?;
    }

    if args.clear_due {
        changes.due_date = None;
    } else if let Some(ref due) = args.due {
        changes.due_date = parse_due_date(due)?;
    }

    Ok(changes)
}

async fn apply_update(service: &BugService, id: i64, changes: &BugChanges, json: bool) -> Result<()> {
    let outcome = service.update_bug(id, changes).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "bug": outcome.bug,
                "notification": outcome.notification.as_str(),
            })
        );
    } else {
        println!("{} Updated bug #{}", "✓".green(), outcome.bug.id);
        println!("  Status: {}", status_colored(outcome.bug.status));
        println!("  Assigned: {}", outcome.bug.assignee_name());
        report_notification(&outcome.notification);
    }

    Ok(())
}

pub async fn update(id: i64, args: UpdateArgs, json: bool) -> Result<()> {
    let service = service()?;
    let bug = service.get_bug(id)?;
    let changes = changes_from(&bug, args)?;
    apply_update(&service, id, &changes, json).await
}

pub async fn close(id: i64, json: bool) -> Result<()> {
    let service = service()?;
    let bug = service.get_bug(id)?;
    if bug.status == Status::Closed {
        bail!("Bug #{} is already closed", id);
    }

    let mut changes = BugChanges::keeping(&bug);
    changes.status = Some(Status::Closed);
    apply_update(&service, id, &changes, json).await
}

pub fn delete(id: i64, json: bool) -> Result<()> {
    service()?.delete_bug(id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("{} Deleted bug #{}", "✓".green(), id);
    }
    Ok(())
}

pub fn dev_list(json: bool) -> Result<()> {
    let developers = service()?.list_developers()?;

    if json {
        println!("{}", serde_json::to_string(&developers)?);
    } else if developers.is_empty() {
        println!("No developers found");
    } else {
        let rows: Vec<DeveloperRow> = developers.iter().map(DeveloperRow::from).collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    Ok(())
}

pub fn dev_add(name: &str, email: &str, json: bool) -> Result<()> {
    let developer = service()?.create_developer(&NewDeveloper::new(name, email))?;

    if json {
        println!("{}", serde_json::to_string(&developer)?);
    } else {
        println!(
            "{} Added developer #{}: {} <{}>",
            "✓".green(),
            developer.id,
            developer.name,
            developer.email
        );
    }
    Ok(())
}

pub fn export(format: ExportFormat, output: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let bugs = open_service(&config)?.list_bugs()?;

    let export = match format {
        ExportFormat::Csv => export::csv(&bugs),
        ExportFormat::Pdf => export::pdf(&bugs, &PdfOptions::from(&config.export)),
    };
    let path = output.unwrap_or_else(|| PathBuf::from(export.filename));
    std::fs::write(&path, &export.bytes)?;

    println!(
        "{} Exported {} bugs to {}",
        "✓".green(),
        bugs.len(),
        path.display()
    );
    Ok(())
}

pub async fn test_email(to: Option<String>) -> Result<()> {
    let config = load_config()?;
    let Some(recipient) = to.or_else(|| config.test_recipient.clone()) else {
        bail!(
            "No recipient given and {} is not set",
            bugtrack_core::config::ENV_TEST_RECIPIENT
        );
    };
    if !config.smtp.is_configured() {
        println!(
            "{} smtp.host is not set; the message is only logged",
            "!".yellow()
        );
    }

    open_service(&config)?.send_test_email(&recipient).await?;
    println!("{} Test email sent successfully to {}", "✓".green(), recipient);
    Ok(())
}

pub fn config_show(json: bool) -> Result<()> {
    let mut config = load_config()?;
    if config.smtp.password.is_some() {
        config.smtp.password = Some("********".to_string());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", "Current configuration:".bold());
        println!("  file: {}", Config::resolve_path().display());
        println!();
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
