use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use clap::Args;
use ehsm_client::{ClientConfig, Credentials, KmsClient};
use log::debug;

/// Request a quote from the eHSM KMS enclave and save it
#[derive(Args, Debug)]
pub struct GenerateQuoteArgs {
    /// Address of the eHSM KMS server, for example https://127.0.0.1:9000
    #[arg(long, required_unless_present = "config")]
    url: Option<String>,

    /// Path of the file receiving the quote
    #[arg(long)]
    quote: PathBuf,

    /// Challenge bound to the quote
    #[arg(long, default_value_t = String::from("challenge123456"))]
    challenge: String,

    /// Application id (defaults to $EHSM_APPID)
    #[arg(long)]
    appid: Option<String>,

    /// Application key (defaults to $EHSM_APIKEY)
    #[arg(long)]
    apikey: Option<String>,

    /// JSON client configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Accept self-signed server certificates
    #[arg(long, action)]
    insecure: bool,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl GenerateQuoteArgs {
    pub fn run(&self) -> Result<()> {
        let client = KmsClient::new(self.client_config()?)?;
        let quote = client.generate_quote(self.challenge.as_bytes())?;

        write_quote(&self.quote, &quote)?;

        println!("Quote: {:?}", self.quote);

        Ok(())
    }

    /// Environment, then configuration file, then command line flags.
    fn client_config(&self) -> Result<ClientConfig> {
        let flags = Credentials {
            appid: self.appid.clone(),
            apikey: self.apikey.clone(),
        };

        let mut config = match (&self.config, &self.url) {
            (Some(path), url) => {
                let file = ClientConfig::from_file(path)?;
                let mut config = ClientConfig::new(
                    url.as_deref().unwrap_or(file.base_url()),
                    Credentials::from_env().merge(file.credentials.clone()),
                )?;
                config.verify_certificate = file.verify_certificate;
                config.timeout = file.timeout;
                config
            }
            (None, Some(url)) => ClientConfig::new(url, Credentials::from_env())?,
            (None, None) => return Err(anyhow!("--url or --config is required")),
        };

        config.credentials = config.credentials.merge(flags);
        if self.insecure {
            config.verify_certificate = false;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Duration::from_secs(timeout);
        }

        debug!("KMS client configuration: {config:?}");

        Ok(config)
    }
}

/// Write `quote` as received, without adding a trailing newline.
fn write_quote(path: &Path, quote: &str) -> Result<()> {
    fs::write(path, quote.as_bytes())
        .map_err(|e| anyhow!("can't write quote to {}: {e}", path.display()))
}
