//! Markdown rendering for conversations and projects.
//!
//! Conversation bodies are an append log: a title, then one block per message,
//! then the [`END_MARKER`] line. Every message block opens with an anchor
//! comment carrying the message uuid. Both comments are invisible in
//! Obsidian's reading view.

use crate::frontmatter::Frontmatter;
use crate::model::{Conversation, Message, Project, ProjectDoc};
use std::io::{self, Write};

/// Marks the end of system-appended content in a conversation document.
pub const END_MARKER: &str = "<!-- obsidize:end -->";

const ANCHOR_OPEN: &str = "<!-- obsidize:message ";
const ANCHOR_CLOSE: &str = " -->";

/// Extensions written verbatim; anything else is wrapped in a code fence.
const PROSE_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

pub fn message_anchor(uuid: &str) -> String {
    format!("{ANCHOR_OPEN}{uuid}{ANCHOR_CLOSE}")
}

/// The message uuid of an anchor line, if `line` is one.
pub fn parse_anchor(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix(ANCHOR_OPEN)?
        .strip_suffix(ANCHOR_CLOSE)
        .map(str::trim)
}

fn write_header<W: Write>(writer: &mut W, fm: &Frontmatter<'_>) -> io::Result<()> {
    let header = fm.render().map_err(io::Error::other)?;
    write!(writer, "{}", header)?;
    writeln!(writer)
}

pub fn render_conversation<W: Write>(
    writer: &mut W,
    fm: &Frontmatter<'_>,
    conversation: &Conversation,
) -> io::Result<()> {
    write_header(writer, fm)?;
    writeln!(writer, "# {}", conversation.title)?;
    writeln!(writer)?;
    if let Some(summary) = &conversation.summary {
        for line in summary.lines() {
            writeln!(writer, "> {}", line)?;
        }
        writeln!(writer)?;
    }
    for msg in &conversation.messages {
        render_message(writer, msg)?;
    }
    writeln!(writer, "{}", END_MARKER)?;
    Ok(())
}

/// One message block, terminated by a blank line.
pub fn render_message<W: Write>(writer: &mut W, msg: &Message) -> io::Result<()> {
    writeln!(writer, "{}", message_anchor(&msg.uuid))?;
    writeln!(
        writer,
        "## {} · {}",
        msg.sender.label(),
        msg.created_at.format("%Y-%m-%d %H:%M UTC")
    )?;
    writeln!(writer)?;

    if !msg.text.is_empty() {
        writeln!(writer, "{}", msg.text.trim_end())?;
        writeln!(writer)?;
    }

    for attachment in &msg.attachments {
        writeln!(writer, "**Attachment:** `{}`", attachment.file_name)?;
        writeln!(writer)?;
        if let Some(content) = &attachment.extracted_content {
            let fence = fence_for(content);
            writeln!(writer, "{}text", fence)?;
            writeln!(writer, "{}", content.trim_end())?;
            writeln!(writer, "{}", fence)?;
            writeln!(writer)?;
        }
    }

    if !msg.files.is_empty() {
        writeln!(writer, "**Files:**")?;
        for name in &msg.files {
            writeln!(writer, "- `{}`", name)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// A link from the overview to one project document.
#[derive(Debug, Clone)]
pub struct DocLink {
    /// Vault-relative target without extension, e.g. `research/01_notes`.
    pub target: String,
    /// Original export filename.
    pub label: String,
}

pub fn render_project_overview<W: Write>(
    writer: &mut W,
    fm: &Frontmatter<'_>,
    project: &Project,
    links: &[DocLink],
) -> io::Result<()> {
    write_header(writer, fm)?;
    writeln!(writer, "# {}", project.name)?;
    writeln!(writer)?;

    if let Some(description) = &project.description {
        writeln!(writer, "{}", description.trim_end())?;
        writeln!(writer)?;
    }

    if let Some(template) = &project.prompt_template {
        writeln!(writer, "## Prompt template")?;
        writeln!(writer)?;
        writeln!(writer, "{}", template.trim_end())?;
        writeln!(writer)?;
    }

    writeln!(writer, "## Documents")?;
    writeln!(writer)?;
    if links.is_empty() {
        writeln!(writer, "_No documents._")?;
    }
    for (i, link) in links.iter().enumerate() {
        writeln!(writer, "{}. [[{}|{}]]", i + 1, link.target, link.label)?;
    }
    Ok(())
}

pub fn render_project_doc<W: Write>(
    writer: &mut W,
    fm: &Frontmatter<'_>,
    doc: &ProjectDoc,
    extension: &str,
) -> io::Result<()> {
    write_header(writer, fm)?;
    let content = doc.content.trim_end();
    if PROSE_EXTENSIONS.contains(&extension) {
        if !content.is_empty() {
            writeln!(writer, "{}", content)?;
        }
    } else {
        let fence = fence_for(content);
        writeln!(writer, "{}{}", fence, extension)?;
        writeln!(writer, "{}", content)?;
        writeln!(writer, "{}", fence)?;
    }
    Ok(())
}

/// A backtick fence longer than any backtick run inside `content`.
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}
