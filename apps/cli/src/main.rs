use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    evidence::collector_candidates, CaseListFilter, CaseWizard, Dashboard, DentefierClient,
    EvidenceAttachment, EvidenceDraft, EvidenceEdit, MissingGeolocator, StatusFilter, TypeFilter,
    WizardField, WizardSession,
};
use shared::domain::{CaseId, CaseStatus, EvidenceId, CASE_TYPE_SUGGESTIONS};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "dentefier", about = "Forensic dental case records")]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List cases, optionally filtered.
    Cases {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value = "todos")]
        status: String,
        #[arg(long = "type", default_value = "todos")]
        case_type: String,
    },
    /// Status, type and responsible totals plus the latest cases.
    Dashboard,
    /// Register a new case.
    RegisterCase(RegisterCaseArgs),
    #[command(subcommand)]
    Evidences(EvidenceCommand),
    /// Users who may be named as evidence collectors.
    Collectors,
    /// Case types offered by the registration form and list filters.
    CaseTypes,
}

#[derive(Args, Debug)]
struct RegisterCaseArgs {
    #[arg(long)]
    number: String,
    #[arg(long)]
    title: String,
    #[arg(long)]
    opened_at: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long = "type", default_value = "")]
    case_type: String,
    #[arg(long, default_value = "")]
    origin: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "")]
    individual_name: String,
    #[arg(long, default_value = "")]
    individual_age: String,
    #[arg(long, default_value = "")]
    individual_sex: String,
    #[arg(long, allow_hyphen_values = true)]
    lat: String,
    #[arg(long, allow_hyphen_values = true)]
    lng: String,
    #[arg(long, default_value = "")]
    address: String,
}

#[derive(Subcommand, Debug)]
enum EvidenceCommand {
    List,
    Add {
        #[arg(long)]
        case: String,
        #[arg(long)]
        kind: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        collector: Option<String>,
        #[arg(long)]
        collected_on: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Fields left out keep their stored values.
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        collector: Option<String>,
        #[arg(long)]
        collected_on: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Save the stored file of an evidence.
    Download {
        #[arg(long)]
        id: String,
        #[arg(long)]
        out: PathBuf,
    },
}

async fn read_attachment(path: &Path) -> Result<EvidenceAttachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "arquivo".into());
    Ok(EvidenceAttachment::new(filename, bytes))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(&cli.config)?;
    if let Some(v) = cli.api_url {
        settings.api_base_url = v;
    }
    if let Some(v) = cli.username {
        settings.username = Some(v);
    }
    if let Some(v) = cli.password {
        settings.password = Some(v);
    }

    let client = Arc::new(
        DentefierClient::new(&settings.api_base_url).context("invalid API base url")?,
    );
    let (Some(username), Some(password)) = (&settings.username, &settings.password) else {
        bail!("username and password are required (flags, env or {DEFAULT_CONFIG_FILE})");
    };
    let current_user = client
        .login(username, password)
        .await
        .context("login failed")?;
    info!(user = %current_user.username, api = %client.base_url(), "session started");

    match cli.command {
        Command::Cases {
            search,
            status,
            case_type,
        } => {
            let status = StatusFilter::parse(&status)?;
            let case_type = TypeFilter::parse(&case_type);
            let cases = CaseListFilter::new(client.list_cases().await?, Default::default());
            for case in cases.filter(&search, status, case_type) {
                println!(
                    "#{} • {} • {} • {}",
                    case.case_number,
                    case.status,
                    case.case_type(),
                    case.title
                );
            }
        }
        Command::Dashboard => {
            let dashboard = Dashboard::load(client.as_ref()).await?;
            let summary = dashboard.summary();
            println!("Total de casos: {}", summary.total);
            for (status, count) in &summary.by_status {
                println!("  {status}: {count}");
            }
            println!("Por tipo:");
            for (case_type, count) in &summary.by_type {
                println!("  {case_type}: {count}");
            }
            println!("Por perito:");
            for (name, count) in &summary.by_responsible {
                println!("  {name}: {count}");
            }
            println!("Casos recentes:");
            for case in &summary.recent {
                println!(
                    "  {} • {} • {} • {}",
                    case.created_at.format("%Y-%m-%d"),
                    case.title,
                    case.status,
                    case.responsible_name
                );
            }
        }
        Command::RegisterCase(args) => {
            if !args.case_type.is_empty() && !CASE_TYPE_SUGGESTIONS.contains(&args.case_type.as_str())
            {
                warn!(case_type = %args.case_type, "case type is not one of the suggestions");
            }
            let mut wizard = CaseWizard::new(current_user);
            if let Some(status) = &args.status {
                wizard.set_status(CaseStatus::parse(status)?);
            }
            let mut entries = vec![
                (WizardField::CaseNumber, args.number),
                (WizardField::Title, args.title),
                (WizardField::IndividualName, args.individual_name),
                (WizardField::IndividualEstimatedAge, args.individual_age),
                (WizardField::IndividualSex, args.individual_sex),
                (WizardField::CaseType, args.case_type),
                (WizardField::DemandOrigin, args.origin),
                (WizardField::Description, args.description),
                (WizardField::Latitude, args.lat),
                (WizardField::Longitude, args.lng),
                (WizardField::FullAddress, args.address),
            ];
            if let Some(opened_at) = args.opened_at {
                entries.push((WizardField::OpenedAt, opened_at));
            }
            entries.sort_by_key(|(field, _)| field.section());
            for (field, value) in entries {
                wizard.jump_to(field.section().index())?;
                wizard.set_field(field, value);
            }

            let session = WizardSession::new(wizard, client.clone(), Arc::new(MissingGeolocator));
            session.submit().await.context("Falha ao salvar caso")?;
            println!("Caso salvo com sucesso!");
        }
        Command::Evidences(EvidenceCommand::List) => {
            for evidence in client.list_evidences().await? {
                let case = evidence
                    .case
                    .as_ref()
                    .map(|case| format!("#{} {}", case.case_number, case.title))
                    .unwrap_or_default();
                println!(
                    "{} • {} • {} • {}",
                    evidence.id, evidence.kind, evidence.description, case
                );
            }
        }
        Command::Evidences(EvidenceCommand::Add {
            case,
            kind,
            description,
            collector,
            collected_on,
            file,
        }) => {
            let mut draft = EvidenceDraft::new(CaseId(case), &current_user);
            draft.kind = kind;
            draft.description = description;
            if let Some(collector) = collector {
                draft.collected_by = collector;
            }
            if let Some(collected_on) = collected_on {
                draft.collected_on = collected_on;
            }
            if let Some(path) = file {
                draft.attachment = Some(read_attachment(&path).await?);
            }
            client.create_evidence(draft).await?;
            println!("Evidência criada");
        }
        Command::Evidences(EvidenceCommand::Update {
            id,
            kind,
            description,
            collector,
            collected_on,
            file,
        }) => {
            let id = EvidenceId(id);
            let evidences = client.list_evidences().await?;
            let stored = evidences
                .iter()
                .find(|evidence| evidence.id == id)
                .with_context(|| format!("evidence '{id}' not found"))?;
            let mut edit = EvidenceEdit::from_evidence(stored);
            if let Some(kind) = kind {
                edit.kind = kind;
            }
            if let Some(description) = description {
                edit.description = description;
            }
            if let Some(collector) = collector {
                edit.collected_by = collector;
            }
            if let Some(collected_on) = collected_on {
                edit.collected_on = collected_on;
            }
            if let Some(path) = file {
                edit.attachment = Some(read_attachment(&path).await?);
            }
            client.update_evidence(&id, edit).await?;
            println!("Evidência atualizada");
        }
        Command::Evidences(EvidenceCommand::Delete { id }) => {
            client.delete_evidence(&EvidenceId(id)).await?;
            println!("Evidência excluída");
        }
        Command::Evidences(EvidenceCommand::Download { id, out }) => {
            let bytes = client.download_evidence_file(&EvidenceId(id)).await?;
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("failed to write '{}'", out.display()))?;
            println!("{} bytes salvos em {}", bytes.len(), out.display());
        }
        Command::Collectors => {
            let users = client.list_users(100).await?;
            for user in collector_candidates(&users) {
                println!("{} ({})", user.username, user.role);
            }
        }
        Command::CaseTypes => {
            for case_type in CASE_TYPE_SUGGESTIONS {
                println!("{case_type}");
            }
        }
    }

    Ok(())
}
