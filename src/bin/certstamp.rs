//! certstamp CLI: renders sample certificates for one course.
//!
//! Prints one JSON object per rendered document to stdout.

use chrono::NaiveDate;
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use certstamp::{CertEngine, CertError, CourseCatalog, EngineSettings, Student};

#[derive(Parser)]
#[command(name = "certstamp")]
#[command(about = "Render certificate documents and their verification pages")]
struct Cli {
    /// Course catalog (JSON)
    #[arg(long, default_value = "certificates.json")]
    catalog: PathBuf,

    /// Engine settings (JSON); defaults plus CERTSTAMP_* environment overrides when absent
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Course id to render
    #[arg(short = 'c', long)]
    course_id: String,

    /// Student name; repeatable
    #[arg(short = 'n', long = "name")]
    names: Vec<String>,

    /// File with one student name per line
    #[arg(short = 'f', long)]
    input_file: Option<PathBuf>,

    /// Copy the document here (single name only)
    #[arg(short = 'w', long)]
    output_file: Option<PathBuf>,

    /// Override the course's template PDF file name
    #[arg(short = 't', long)]
    template_file: Option<String>,

    /// Override the long organization name
    #[arg(short = 'o', long)]
    long_org: Option<String>,

    /// Override the long course name
    #[arg(short = 'l', long)]
    long_course: Option<String>,

    /// Issue date, YYYY-MM-DD
    #[arg(short = 'i', long, value_parser = parse_date)]
    issued_date: Option<NaiveDate>,

    #[arg(short = 'g', long)]
    grade: Option<String>,

    #[arg(short = 'd', long)]
    designation: Option<String>,

    /// Keep the output directories after publishing to the web root
    #[arg(long)]
    keep: bool,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| format!("{raw}: {err}"))
}

fn read_names(path: &Path) -> Result<Vec<String>, CertError> {
    let raw = fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn load_catalog(cli: &Cli) -> Result<CourseCatalog, CertError> {
    let mut catalog = CourseCatalog::load(&cli.catalog)?;
    if cli.long_org.is_none() && cli.long_course.is_none() && cli.template_file.is_none() {
        return Ok(catalog);
    }
    let mut config = catalog.get(&cli.course_id)?.clone();
    if let Some(long_org) = &cli.long_org {
        config.long_org = Some(long_org.clone());
    }
    if let Some(long_course) = &cli.long_course {
        config.long_course = Some(long_course.clone());
    }
    if let Some(template) = &cli.template_file {
        config.template_file = certstamp::TemplatePdf::Named(template.clone());
    }
    catalog.insert(cli.course_id.clone(), config);
    Ok(catalog)
}

fn run(cli: Cli) -> Result<(), CertError> {
    let mut settings = match &cli.settings {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::default(),
    };
    settings.apply_env();

    let mut names = cli.names.clone();
    if let Some(path) = &cli.input_file {
        names.extend(read_names(path)?);
    }
    if names.is_empty() {
        names.push("John Smith".to_string());
    }
    if cli.output_file.is_some() && names.len() > 1 {
        return Err(CertError::InvalidConfiguration(
            "--output-file needs exactly one name".to_string(),
        ));
    }

    let web_root = settings.web_root.clone();
    let engine = CertEngine::builder()
        .settings(settings)
        .catalog(load_catalog(&cli)?)
        .build()?;
    let session = engine.session(&cli.course_id, cli.designation.as_deref())?;

    for name in names {
        let mut student = Student::new(name);
        student.grade = cli.grade.clone();
        student.issue_date = cli.issued_date;
        let artifact = session.render(&student)?;

        if let Some(target) = &cli.output_file {
            fs::copy(&artifact.document_path, target)?;
        }
        if let Some(root) = &web_root {
            artifact.publish_to(root)?;
            if !cli.keep {
                artifact.cleanup();
            }
        }

        let (download_id, verify_id, download_url) = artifact.triple();
        let summary = serde_json::json!({
            "student": student.name,
            "download_id": download_id,
            "verify_id": verify_id,
            "download_url": download_url,
            "verify_url": artifact.verify_url,
            "document": artifact.document_path,
        });
        println!("{summary}");
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("certstamp: {err}");
            ExitCode::FAILURE
        }
    }
}
