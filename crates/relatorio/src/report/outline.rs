//! Renders a cleaned heading tree into the template.
//!
//! The tree is first flattened into a heading plan by the core; the plan is
//! then turned into body blocks and spliced in where the marker paragraph
//! was, in one batch.

use docx::{Alignment, Block, Document, ParagraphStyle};
use relatorio_core::outline::{expand, find_closing_section, HeadingEntry, OutlineNode};
use relatorio_core::signature::{SignatureLine, SignatureLineKind, NAME_COLOR, SIGNATURE_BLOCK};

/// What happened to the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineOutcome {
    /// No marker paragraph in the template.
    NoMarker,
    /// The outline was empty; the marker was removed.
    MarkerRemoved,
    Rendered { headings: usize, signature: bool },
}

/// Blocks for a heading plan, with the signature block after the closing
/// section heading when there is one.
pub fn plan_blocks(plan: &[HeadingEntry], style_prefix: &str) -> (Vec<Block>, bool) {
    let closing = find_closing_section(plan);
    let mut blocks = Vec::with_capacity(plan.len() * 2 + SIGNATURE_BLOCK.len());

    for (i, entry) in plan.iter().enumerate() {
        if entry.page_break_before {
            blocks.push(Block::page_break());
        }
        blocks.push(Block::heading(entry.level, &entry.title, style_prefix));
        if closing == Some(i) {
            blocks.extend(SIGNATURE_BLOCK.iter().map(signature_block));
        }
    }

    (blocks, closing.is_some())
}

fn signature_block(line: &SignatureLine) -> Block {
    let style = match line.kind {
        SignatureLineKind::Blank => return Block::blank(),
        SignatureLineKind::Instruction => ParagraphStyle {
            alignment: Some(Alignment::Both),
            ..ParagraphStyle::default()
        },
        SignatureLineKind::Name => ParagraphStyle {
            alignment: Some(Alignment::Center),
            bold: true,
            color: Some(NAME_COLOR.to_string()),
            ..ParagraphStyle::default()
        },
        SignatureLineKind::Role => ParagraphStyle {
            alignment: Some(Alignment::Center),
            ..ParagraphStyle::default()
        },
    };
    Block::paragraph(line.text, &style)
}

/// Replace the marker paragraph of `document` with `nodes`.
pub fn render_outline(
    document: &mut Document,
    marker: &str,
    nodes: &[OutlineNode],
    style_prefix: &str,
) -> Result<OutlineOutcome, docx::DocxError> {
    let positions = document.find_paragraphs(marker)?;
    let Some(&position) = positions.first() else {
        log::warn!("Outline marker '{marker}' not found in template");
        return Ok(OutlineOutcome::NoMarker);
    };
    if positions.len() > 1 {
        log::warn!(
            "Outline marker '{marker}' found {} times; using the first",
            positions.len()
        );
    }

    if nodes.is_empty() {
        document.remove_block(position);
        return Ok(OutlineOutcome::MarkerRemoved);
    }

    let plan = expand(nodes);
    let (blocks, signature) = plan_blocks(&plan, style_prefix);
    document.replace_block(position, blocks)?;

    Ok(OutlineOutcome::Rendered {
        headings: plan.len(),
        signature,
    })
}
