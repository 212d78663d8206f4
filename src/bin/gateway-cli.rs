use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use url::Url;

use emr_gateway::waf::{PatternRegistry, RequestScanner, ScanFinding};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Ops CLI for the EMR security gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a full URL (path + query) against the built-in rules
    ScanUrl { url: String },
    /// Scan a JSON file as a request body
    ScanJson { file: PathBuf },
    /// Send a GET probe through a running gateway and report the outcome
    Probe { url: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let scanner = RequestScanner::new(Arc::new(PatternRegistry::builtin()));

    match cli.command {
        Commands::ScanUrl { url } => {
            let parsed = Url::parse(&url)?;
            let mut findings = scanner.scan_path(parsed.path());
            let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
            findings.extend(scanner.scan_query(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))));
            print_findings(&findings)?;
        }
        Commands::ScanJson { file } => {
            let text = std::fs::read_to_string(&file)?;
            let body: serde_json::Value = serde_json::from_str(&text)?;
            print_findings(&scanner.scan_body(&body))?;
        }
        Commands::Probe { url } => {
            let response = reqwest::Client::new().get(&url).send().await?;
            let status = response.status();
            println!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            );
            let text = response.text().await?;
            if !text.is_empty() {
                println!("{}", text);
            }
        }
    }

    Ok(())
}

fn print_findings(findings: &[ScanFinding]) -> Result<(), Box<dyn std::error::Error>> {
    if findings.is_empty() {
        println!("clean");
    } else {
        println!("{}", serde_json::to_string_pretty(findings)?);
    }
    Ok(())
}
