use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding the dataset, config.yaml and every cached artifact
    #[clap(long, global = true, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Defaults to `run` with every option, model and configured query
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Preprocessing option (0-5), repeatable. All six when omitted.
    #[clap(short, long = "option", value_parser = clap::value_parser!(u8).range(0..=5))]
    pub options: Vec<u8>,

    /// Model key or name, repeatable. Every configured model when omitted.
    #[clap(short, long = "model")]
    pub models: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build missing artifacts and print the top matches for every configured query
    Run {
        #[clap(flatten)]
        selection: SelectionArgs,

        /// Number of neighbours per query (overrides config)
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Build missing normalized texts, embeddings and indexes without querying
    Build {
        #[clap(flatten)]
        selection: SelectionArgs,
    },
    /// Run one ad-hoc query
    Query {
        /// Query text
        text: String,

        /// Preprocessing option (0-5)
        #[clap(
            short,
            long,
            default_value = "0",
            value_parser = clap::value_parser!(u8).range(0..=5)
        )]
        option: u8,

        /// Model key or name
        #[clap(short, long, default_value = "minilm")]
        model: String,

        /// Number of neighbours (overrides config)
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// List configured models
    Models {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand() {
        let args = Args::try_parse_from(["profile-index"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn test_run_filters() {
        let args = Args::try_parse_from([
            "profile-index",
            "run",
            "-o",
            "1",
            "--option",
            "4",
            "-m",
            "minilm",
            "-k",
            "3",
            "--data-dir",
            "/tmp/x",
        ])
        .unwrap();

        assert_eq!(args.data_dir, PathBuf::from("/tmp/x"));
        match args.command {
            Some(Command::Run { selection, top_k }) => {
                assert_eq!(selection.options, vec![1, 4]);
                assert_eq!(selection.models, vec!["minilm".to_string()]);
                assert_eq!(top_k, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_option_out_of_range() {
        assert!(Args::try_parse_from(["profile-index", "build", "--option", "6"]).is_err());
    }

    #[test]
    fn test_query_defaults() {
        let args = Args::try_parse_from(["profile-index", "query", "vegan chefs"]).unwrap();
        match args.command {
            Some(Command::Query {
                text,
                option,
                model,
                top_k,
            }) => {
                assert_eq!(text, "vegan chefs");
                assert_eq!(option, 0);
                assert_eq!(model, "minilm");
                assert_eq!(top_k, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
