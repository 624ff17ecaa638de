use angle_role_audit::config::chains::ChainId;
use angle_role_audit::registry::Directory;
use angle_role_audit::utils::config::RegistrySource;
use anyhow::{anyhow, Result};

#[derive(Debug)]
struct Args {
    chain: ChainId,
    contract: Option<String>,
    source: RegistrySource,
}

fn print_usage() {
    eprintln!(
        "usage: list_contracts <chainId> [<contract path, e.g. EUR.Treasury>] [--registry <file|url>]\n\
         prints the chain's flattened contract list as JSON, or the address of one contract\n\
         env fallback: REGISTRY_PATH or REGISTRY_URL"
    );
}

fn source_from(raw: String) -> RegistrySource {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        RegistrySource::Url(raw)
    } else {
        RegistrySource::Path(raw)
    }
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut source = std::env::var("REGISTRY_PATH")
        .ok()
        .map(RegistrySource::Path)
        .or_else(|| std::env::var("REGISTRY_URL").ok().map(RegistrySource::Url));

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--registry" | "-r" => {
                let raw = iter
                    .next()
                    .ok_or_else(|| anyhow!("missing value for {arg}"))?;
                source = Some(source_from(raw));
            }
            other if other.starts_with('-') => return Err(anyhow!("unknown argument '{other}'")),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let chain_raw = positional
        .next()
        .ok_or_else(|| anyhow!("chain id is required"))?;
    let chain = chain_raw.parse::<ChainId>()?;
    let contract = positional.next();
    if let Some(extra) = positional.next() {
        return Err(anyhow!("unexpected argument '{extra}'"));
    }
    let source =
        source.ok_or_else(|| anyhow!("--registry (or REGISTRY_PATH/REGISTRY_URL env) is required"))?;

    Ok(Args {
        chain,
        contract,
        source,
    })
}

async fn run(args: Args) -> Result<String> {
    let directory = Directory::load(&args.source).await?;
    let registry = directory.directory(args.chain)?;
    match args.contract {
        Some(path) => registry
            .address(&path)
            .map(|address| address.to_string())
            .ok_or_else(|| anyhow!("no contract `{path}` on chain {}", args.chain)),
        None => {
            let contracts = registry
                .flatten()
                .into_iter()
                .map(|address| address.to_string())
                .collect::<Vec<_>>();
            Ok(serde_json::to_string_pretty(&contracts)?)
        }
    }
}

#[tokio::main]
async fn main() {
    angle_role_audit::utils::env_guard::load_dot_env();
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err}");
            print_usage();
            std::process::exit(1);
        }
    };
    match run(args).await {
        Ok(output) => println!("{output}"),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
