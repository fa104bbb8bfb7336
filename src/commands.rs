use std::io::Read;

use anyhow::{Context, Result};
use serde::Serialize;

use docgit::db::{Database, DatabaseConfig};
use docgit::storage::{Author, Document, MergeOutcome};

use crate::cli::{BranchAction, Cli, Command, OutputFormat, TagAction};

#[derive(Serialize)]
struct DocumentView<'a> {
    key: &'a str,
    content: String,
}

impl<'a> From<&'a Document> for DocumentView<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            key: doc.key.as_str(),
            content: String::from_utf8_lossy(&doc.content).into_owned(),
        }
    }
}

pub fn run_command(cli: Cli) -> Result<()> {
    let config = DatabaseConfig::new(&cli.database).default_branch(cli.branch_default.as_str());
    let db = Database::open_with_config(config)
        .with_context(|| format!("opening database at {}", cli.database.display()))?;
    let author = Author::new(cli.author.as_str(), cli.email.as_str());
    let format = cli.format;

    match cli.command {
        Command::Get(args) => {
            let doc = db.get(&args.branch, &args.key)?;
            match format {
                OutputFormat::Json => print_json(&DocumentView::from(&doc))?,
                OutputFormat::Text => println!("{}", String::from_utf8_lossy(&doc.content)),
            }
        }

        Command::Ls(args) => {
            let docs = match args.page_size {
                Some(size) => db.list_paged(&args.branch, &args.prefix, args.start, size)?,
                None => db.list(&args.branch, &args.prefix)?.into_iter().skip(args.start).collect(),
            };
            match format {
                OutputFormat::Json => {
                    let views: Vec<DocumentView<'_>> = docs.iter().map(DocumentView::from).collect();
                    print_json(&views)?;
                }
                OutputFormat::Text => {
                    for doc in &docs {
                        println!("{}", doc.key);
                    }
                }
            }
        }

        Command::Save(args) => {
            let content = match (args.content, args.file) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => {
                    std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?
                }
                (None, None) => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
                    buf
                }
            };
            let message = args.message.unwrap_or_else(|| format!("save {}", args.key));
            let doc = Document::new(args.key, content)?;
            let head = db.save(&args.branch, &message, doc, &author)?;
            print_commit(format, &head.to_string())?;
        }

        Command::Rm(args) => {
            let message = args.message.unwrap_or_else(|| format!("delete {}", args.key));
            let head = db.delete(&args.branch, &args.key, &message, &author)?;
            print_commit(format, &head.to_string())?;
        }

        Command::Branch(args) => match args.action {
            BranchAction::List => {
                let branches = db.list_branches()?;
                match format {
                    OutputFormat::Json => print_json(&branches)?,
                    OutputFormat::Text => {
                        for branch in &branches {
                            println!("{} {}", branch.target.short(), branch.name);
                        }
                    }
                }
            }
            BranchAction::Create { name, from } => {
                let head = db.create_branch(&name, &from)?;
                print_commit(format, &head.to_string())?;
            }
            BranchAction::Delete { name } => {
                db.delete_branch(&name)?;
                if let OutputFormat::Text = format {
                    println!("deleted branch {name}");
                }
            }
        },

        Command::Tag(args) => match args.action {
            TagAction::Create { name, target } => {
                let commit = db.create_tag(&name, &target)?;
                print_commit(format, &commit.to_string())?;
            }
            TagAction::Delete { name } => {
                db.delete_tag(&name)?;
                if let OutputFormat::Text = format {
                    println!("deleted tag {name}");
                }
            }
        },

        Command::Merge(args) => {
            let message = args
                .message
                .unwrap_or_else(|| format!("Merge branch '{}' into {}", args.source, args.target));
            let outcome = db.merge(&args.source, &args.target, &author, &message)?;
            match format {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Text => match outcome {
                    MergeOutcome::UpToDate(_) => println!("Already up to date."),
                    MergeOutcome::FastForward(head) => println!("Fast-forward to {}", head.short()),
                    MergeOutcome::Merged(head) => println!("Merged into {} at {}", args.target, head.short()),
                },
            }
        }

        Command::Rebase(args) => {
            let message = args
                .message
                .unwrap_or_else(|| rebase_message(&args.source, &args.target));
            let outcome = db.rebase(&args.source, &args.target, &author, &message)?;
            match format {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Text => {
                    println!("Replayed {} commit(s); {} is at {}", outcome.replayed, args.target, outcome.head.short())
                }
            }
        }

        Command::Diff(args) => {
            let changes = db.diff(&args.from, &args.to)?;
            match format {
                OutputFormat::Json => print_json(&changes)?,
                OutputFormat::Text => {
                    for change in &changes {
                        println!("{}\t{}", change.kind, change.path);
                    }
                }
            }
        }

        Command::Log(args) => {
            let limit = args.limit.unwrap_or(usize::MAX);
            let commits = db
                .log(&args.from, &args.to)?
                .take(limit)
                .collect::<Result<Vec<_>, _>>()?;
            match format {
                OutputFormat::Json => print_json(&commits)?,
                OutputFormat::Text if args.oneline => {
                    for commit in &commits {
                        println!("{} {}", commit.id.short(), commit.summary());
                    }
                }
                OutputFormat::Text => {
                    for commit in &commits {
                        println!("commit {}", commit.id);
                        if commit.is_merge() {
                            let parents: Vec<String> = commit.parent_ids.iter().map(|p| p.short()).collect();
                            println!("Merge: {}", parents.join(" "));
                        }
                        println!("Author: {} <{}>", commit.author.name, commit.author.email);
                        println!("Date:   {}", commit.timestamp.to_rfc2822());
                        println!();
                        for line in commit.message.lines() {
                            println!("    {line}");
                        }
                        println!();
                    }
                }
            }
        }
    }

    Ok(())
}

fn rebase_message(source: &str, target: &str) -> String {
    format!("rebase {source} onto {target}")
}

fn print_commit(format: OutputFormat, id: &str) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "commit": id })),
        OutputFormat::Text => {
            println!("{id}");
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase_message_names_source_first() {
        assert_eq!(rebase_message("feature", "master"), "rebase feature onto master");
    }
}
