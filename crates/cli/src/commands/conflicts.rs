//! `branchsync conflicts <file>`: list the conflict blocks in one file.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use branchsync_core::conflict::resolver::block_preview;
use branchsync_core::conflict::{parse, BlockContext};

use super::{AppContext, Finished};
use crate::style;
use crate::terminal::Verbosity;

pub fn run(ctx: &AppContext, file: &Path) -> Result<Finished> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let blocks = parse(&content);

    if ctx.verbosity != Verbosity::Json {
        let name = file.display().to_string();
        if blocks.is_empty() {
            println!("{}", style::success(&format!("{}: no conflict markers", name)));
        } else {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "Lines", "Current", "Incoming", "Ancestor"]);
            for (i, block) in blocks.iter().enumerate() {
                table.add_row(vec![
                    (i + 1).to_string(),
                    format!("{}-{}", block.start_line, block.end_line),
                    block.current.lines().count().to_string(),
                    block.incoming.lines().count().to_string(),
                    if block.ancestor.is_some() { "yes" } else { "no" }.to_string(),
                ]);
            }
            println!("{}", style::header(&format!("{} conflict(s) in {}", blocks.len(), name)));
            println!("{table}");

            if ctx.verbosity == Verbosity::Normal {
                for (i, block) in blocks.iter().enumerate() {
                    let preview = block_preview(&BlockContext {
                        file_path: &name,
                        index: i + 1,
                        total: blocks.len(),
                        block,
                    });
                    println!("\n{}", preview);
                }
            }
        }
    }

    Finished::new(true, &blocks)
}
