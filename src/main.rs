use anyhow::{Context, Result, anyhow};
use caseload::{
    ConsultDesk, DeskConfig, NewConsultant, NewOrder, NewRequest, OrderId, PaymentConfirmation,
    ReleaseReason, RequestId, RequestStatus, ServiceId, UserId,
};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_DATA_DIR: &str = "caseload-data";

#[derive(Parser)]
#[command(name = "caseload")]
#[command(about = "Capacity-aware consultant assignment desk")]
struct Cli {
    /// Directory holding snapshot.bin and journal.log
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load categories, services, consultants and orders from a JSON fixture
    Seed {
        #[arg(long)]
        file: PathBuf,
    },
    Submit {
        #[arg(long)]
        client: u64,
        #[arg(long)]
        service: u64,
        #[arg(long)]
        priority: Option<i32>,
        #[arg(long, default_value = "")]
        notes: String,
        /// Idempotency key; resubmitting with the same key returns the same request
        #[arg(long)]
        key: Option<Uuid>,
    },
    /// Assign one request, or every pending request with --pending
    Assign {
        #[arg(long, conflicts_with = "pending", required_unless_present = "pending")]
        request: Option<u64>,
        #[arg(long)]
        pending: bool,
    },
    Release {
        #[arg(long)]
        request: u64,
        /// completed, cancelled or unassigned
        #[arg(long, default_value = "completed")]
        reason: ReleaseReason,
    },
    Reassign {
        #[arg(long)]
        request: u64,
    },
    Advance {
        #[arg(long)]
        request: u64,
        #[arg(long)]
        status: RequestStatus,
    },
    /// Mark an order paid and reconcile it
    Pay {
        #[arg(long)]
        order: u64,
        #[arg(long)]
        payment_id: Option<String>,
        #[arg(long)]
        signature: Option<String>,
    },
    /// Reconcile one paid order, or all of them concurrently
    Reconcile {
        #[arg(long)]
        order: Option<u64>,
    },
    /// Verify the workload invariant
    Check,
    /// Print the workload table
    Report,
}

// ============================================================================
// Seed fixture
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    categories: Vec<CategoryFixture>,
    services: Vec<ServiceFixture>,
    consultants: Vec<ConsultantFixture>,
    orders: Vec<OrderFixture>,
}

#[derive(Debug, Deserialize)]
struct CategoryFixture {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ServiceFixture {
    category: String,
    title: String,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    tat: String,
}

#[derive(Debug, Deserialize)]
struct ConsultantFixture {
    #[serde(flatten)]
    profile: NewConsultant,
    /// Service titles
    #[serde(default)]
    expertise: Vec<String>,
    /// Category names, granted in bulk
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OrderFixture {
    #[serde(flatten)]
    order: NewOrder,
    #[serde(default)]
    paid: bool,
}

#[derive(Debug, Default, Serialize)]
struct SeedSummary {
    categories: usize,
    services: usize,
    consultants: usize,
    expertise: usize,
    orders: usize,
    requests_created: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let desk = open_desk(cli.data_dir.as_deref(), cli.config.as_deref()).await?;

    match cli.command {
        Command::Seed { file } => {
            let summary = seed(&desk, &file).await?;
            print_json(&summary)
        }
        Command::Submit {
            client,
            service,
            priority,
            notes,
            key,
        } => {
            let mut new = NewRequest::new(UserId(client), ServiceId(service)).notes(notes);
            if let Some(priority) = priority {
                new = new.priority(priority);
            }
            if let Some(key) = key {
                new = new.request_key(key);
            }
            print_json(&desk.submit_request(new).await?)
        }
        Command::Assign { request, pending } => {
            if pending {
                print_json(&desk.assign_pending().await?)
            } else {
                let request = request.ok_or_else(|| anyhow!("--request or --pending is required"))?;
                print_json(&desk.assign(RequestId(request)).await?)
            }
        }
        Command::Release { request, reason } => {
            print_json(&desk.release(RequestId(request), reason).await?)
        }
        Command::Reassign { request } => print_json(&desk.reassign(RequestId(request)).await?),
        Command::Advance { request, status } => {
            print_json(&desk.advance(RequestId(request), status).await?)
        }
        Command::Pay {
            order,
            payment_id,
            signature,
        } => {
            let payment = PaymentConfirmation {
                gateway_payment_id: payment_id,
                gateway_signature: signature,
            };
            print_json(&desk.mark_order_paid(OrderId(order), payment).await?)
        }
        Command::Reconcile { order } => match order {
            Some(order) => print_json(&desk.reconcile_paid_order(OrderId(order)).await?),
            None => print_json(&desk.reconcile_all_paid().await?),
        },
        Command::Check => {
            let report = desk
                .verify_workload()
                .await
                .context("Workload check failed")?;
            print_json(&report)
        }
        Command::Report => print_json(&desk.workload_report().await),
    }
}

async fn open_desk(data_dir: Option<&Path>, config_path: Option<&Path>) -> Result<ConsultDesk> {
    let config = resolve_config(data_dir, config_path)?;
    let dir = config.data_dir.clone().unwrap_or_default();
    ConsultDesk::open(config)
        .await
        .with_context(|| format!("Failed to open desk at '{}'", dir.display()))
}

/// `--data-dir` wins over the config file, which wins over the default
/// directory.
fn resolve_config(data_dir: Option<&Path>, config_path: Option<&Path>) -> Result<DeskConfig> {
    let mut config = match config_path {
        Some(path) => DeskConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => DeskConfig::default(),
    };

    match data_dir {
        Some(dir) => config.data_dir = Some(dir.to_path_buf()),
        None if config.data_dir.is_none() => config.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR)),
        None => {}
    }
    Ok(config)
}

async fn seed(desk: &ConsultDesk, file: &Path) -> Result<SeedSummary> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read fixture '{}'", file.display()))?;
    let fixture: Fixture = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse fixture '{}'", file.display()))?;

    let mut summary = SeedSummary::default();
    let mut categories = HashMap::new();
    for category in &fixture.categories {
        let created = desk
            .create_category(&category.name, &category.description)
            .await
            .with_context(|| format!("Failed to create category '{}'", category.name))?;
        categories.insert(category.name.to_lowercase(), created.id);
        summary.categories += 1;
    }

    let mut services = HashMap::new();
    for service in &fixture.services {
        let category = categories
            .get(&service.category.to_lowercase())
            .copied()
            .ok_or_else(|| anyhow!("Service '{}' names unknown category '{}'", service.title, service.category))?;
        let created = desk
            .create_service(category, &service.title, service.price, &service.tat)
            .await
            .with_context(|| format!("Failed to create service '{}'", service.title))?;
        services.insert(service.title.to_lowercase(), created.id);
        summary.services += 1;
    }

    for consultant in fixture.consultants {
        let name = consultant.profile.full_name.clone();
        let profile = desk
            .register_consultant(consultant.profile)
            .await
            .with_context(|| format!("Failed to register consultant '{}'", name))?;
        summary.consultants += 1;

        for title in &consultant.expertise {
            let service = services
                .get(&title.to_lowercase())
                .copied()
                .ok_or_else(|| anyhow!("Consultant '{}' names unknown service '{}'", name, title))?;
            if desk.grant_expertise(profile.id, service).await? {
                summary.expertise += 1;
            }
        }
        if !consultant.categories.is_empty() {
            let grant = desk
                .grant_category_expertise(profile.id, &consultant.categories)
                .await?;
            if !grant.unknown_categories.is_empty() {
                tracing::warn!(
                    consultant = %profile.id,
                    unknown = ?grant.unknown_categories,
                    "fixture names unknown categories"
                );
            }
            summary.expertise += grant.granted.len();
        }
    }

    for order in fixture.orders {
        let created = desk.create_order(order.order).await?;
        summary.orders += 1;
        if order.paid {
            let report = desk
                .mark_order_paid(created.id, PaymentConfirmation::default())
                .await?;
            summary.requests_created += report.created();
        }
    }

    Ok(summary)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const FIXTURE: &str = r#"{
        "categories": [{ "name": "Income Tax" }, { "name": "GST" }],
        "services": [
            { "category": "income tax", "title": "ITR Filing", "price": "999.00" },
            { "category": "GST", "title": "GST Return" }
        ],
        "consultants": [
            {
                "user": 10,
                "full_name": "Ravi",
                "max_concurrent_clients": 2,
                "expertise": ["itr filing"]
            },
            { "user": 11, "full_name": "Asha", "categories": ["GST", "Audit"] }
        ],
        "orders": [
            {
                "user": 42,
                "items": [{ "title": "ITR Filing (Salaried)", "price": "999.00" }],
                "paid": true
            },
            { "user": 43, "items": [{ "title": "GST Return", "price": "499.00" }] }
        ]
    }"#;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["caseload", "assign", "--pending"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Assign {
                request: None,
                pending: true
            }
        ));

        let cli = Cli::try_parse_from([
            "caseload",
            "release",
            "--request",
            "7",
            "--reason",
            "cancel",
            "--data-dir",
            "/tmp/desk",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/desk")));
        assert!(matches!(
            cli.command,
            Command::Release {
                request: 7,
                reason: ReleaseReason::Cancelled
            }
        ));

        assert!(Cli::try_parse_from(["caseload", "assign"]).is_err());
        assert!(Cli::try_parse_from(["caseload", "assign", "--request", "1", "--pending"]).is_err());
    }

    #[test]
    fn test_data_dir_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("desk.json");
        fs::write(&config_path, r#"{ "data_dir": "from-config", "paid_priority": 7 }"#).unwrap();

        let config = resolve_config(None, None).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from(DEFAULT_DATA_DIR)));

        let config = resolve_config(None, Some(&config_path)).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("from-config")));
        assert_eq!(config.paid_priority, 7);

        let config = resolve_config(Some(Path::new("from-flag")), Some(&config_path)).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("from-flag")));
        assert_eq!(config.paid_priority, 7);

        assert!(resolve_config(None, Some(&dir.path().join("missing.json"))).is_err());
    }

    #[tokio::test]
    async fn test_seed_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        fs::write(&path, FIXTURE).unwrap();

        let desk = ConsultDesk::new();
        let summary = seed(&desk, &path).await.unwrap();
        assert_eq!(summary.categories, 2);
        assert_eq!(summary.services, 2);
        assert_eq!(summary.consultants, 2);
        assert_eq!(summary.expertise, 2);
        assert_eq!(summary.orders, 2);
        assert_eq!(summary.requests_created, 1);

        let requests = desk.requests_of_client(UserId(42)).await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].status, RequestStatus::Assigned);
        desk.verify_workload().await.unwrap();
    }

    #[tokio::test]
    async fn test_seed_rejects_unknown_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        fs::write(
            &path,
            r#"{
                "categories": [{ "name": "GST" }],
                "consultants": [{ "user": 1, "full_name": "Ravi", "expertise": ["Audit"] }]
            }"#,
        )
        .unwrap();

        let err = seed(&ConsultDesk::new(), &path).await.unwrap_err();
        assert!(err.to_string().contains("unknown service 'Audit'"));
    }
}
