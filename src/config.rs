use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Parser)]
#[command(name = "readstore")]
#[command(about = "Paginated read search over directories of indexed BAM files")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "READSTORE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "READSTORE_PORT", default_value = "8080")]
    pub port: u16,

    /// Dataset to serve, as <id>:<directory> (repeatable)
    #[arg(
        short = 'd',
        long = "dataset",
        env = "READSTORE_DATASETS",
        value_delimiter = ',',
        required = true
    )]
    pub datasets: Vec<DatasetSpec>,

    /// Merged records consumed per search page
    #[arg(long, env = "READSTORE_PAGE_SIZE", default_value = "256", value_parser = parse_page_size)]
    pub page_size: usize,

    /// Enable CORS for all origins
    #[arg(long, env = "READSTORE_CORS", default_value = "true")]
    pub cors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_page_size(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("page size must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// One configured dataset: an id and the directory tree backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub id: String,
    pub directory: PathBuf,
}

/// Dataset ids look like identifiers: `[A-Za-z$_][A-Za-z0-9$_]*`.
fn is_valid_dataset_id(id: &str) -> bool {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let word = |c: char| c.is_ascii_alphanumeric() || c == '$' || c == '_';
    (first.is_ascii_alphabetic() || first == '$' || first == '_') && chars.all(word)
}

impl FromStr for DatasetSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, directory) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <id>:<directory>, got {:?}", s))?;
        if !is_valid_dataset_id(id) {
            return Err(format!("invalid dataset id {:?}", id));
        }
        if directory.is_empty() {
            return Err(format!("dataset {} has no directory", id));
        }
        Ok(Self {
            id: id.to_string(),
            directory: PathBuf::from(directory),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_spec_parsing() {
        let spec: DatasetSpec = "reads_2024:/data/reads".parse().unwrap();
        assert_eq!(spec.id, "reads_2024");
        assert_eq!(spec.directory, PathBuf::from("/data/reads"));

        let spec: DatasetSpec = "$tmp:relative/dir:with:colons".parse().unwrap();
        assert_eq!(spec.id, "$tmp");
        assert_eq!(spec.directory, PathBuf::from("relative/dir:with:colons"));
    }

    #[test]
    fn test_dataset_spec_rejects_bad_input() {
        for bad in ["no-colon", "1abc:/data", "has-dash:/data", ":/data", "ok:"] {
            assert!(bad.parse::<DatasetSpec>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["readstore", "-d", "ds:/data"]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.page_size, 256);
        assert!(config.cors);
        assert_eq!(config.datasets.len(), 1);
    }

    #[test]
    fn test_repeated_datasets_and_page_size() {
        let config = Config::try_parse_from([
            "readstore",
            "--dataset",
            "one:/a",
            "--dataset",
            "two:/b",
            "--page-size",
            "10",
            "--port",
            "3000",
        ])
        .unwrap();
        let ids: Vec<_> = config.datasets.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["one", "two"]);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let result = Config::try_parse_from(["readstore", "-d", "ds:/data", "--page-size", "0"]);
        assert!(result.is_err());
    }
}
