use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use quill_engine::cst::print;
use quill_engine::{Language, build, parse, parse_tree};
use quill_errors::Renderer;

/// Runs the JSON grammar over a file.
#[derive(Parser)]
enum Options {
    /// Checks that the file parses.
    Parse { path: Utf8PathBuf },
    /// Prints the committed tags, one per line.
    Tags { path: Utf8PathBuf },
    /// Prints an outline of the tree.
    Tree { path: Utf8PathBuf },
    /// Rebuilds the file from its tree and prints the result.
    Reprint {
        path: Utf8PathBuf,
        /// Drop the layout and print the canonical form instead.
        #[arg(long)]
        canonical: bool,
    },
}

impl Options {
    fn path(&self) -> &Utf8Path {
        match self {
            Self::Parse { path } | Self::Tags { path } | Self::Tree { path } | Self::Reprint { path, .. } => path,
        }
    }
}

fn tags(language: &Language, text: &str) -> quill_errors::Result<()> {
    for tag in parse(language, text) {
        println!("{}", tag?);
    }
    Ok(())
}

fn reprint(language: &Language, text: &str, canonical: bool) -> quill_errors::Result<String> {
    let tree = parse_tree(language, text)?;
    let value = if canonical { tree.to_abstract() } else { tree };
    Ok(print(&build(language, &value)?))
}

fn main() -> anyhow::Result<()> {
    let options = Options::parse();
    let path = options.path();
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read `{path}`"))?;
    let language = quill_json::language().context("failed to load the JSON grammar")?;

    let result = match &options {
        Options::Parse { .. } => parse_tree(&language, &text).map(drop),
        Options::Tags { .. } => tags(&language, &text),
        Options::Tree { .. } => parse_tree(&language, &text).map(|tree| print!("{}", tree.debug_tree())),
        Options::Reprint { canonical, .. } => reprint(&language, &text, *canonical).map(|text| print!("{text}")),
    };

    if let Err(error) = result {
        let renderer = Renderer::styled();
        eprintln!("{}", error.diagnostic(&text).render(&renderer, path.as_str(), &text));
        anyhow::bail!("`{path}` did not parse");
    }
    Ok(())
}
