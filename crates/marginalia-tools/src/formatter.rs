// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Renders tool results into the context block appended to a user message.

use std::fmt::Write;

use chrono::DateTime;
use marginalia_core::{Book, Note};

use crate::executor::{SourceTag, ToolContent, ToolResult};

const BLOCK_START: &str = "\n\n---\n【以下是从你的读书笔记中检索到的相关内容】\n";
const BLOCK_END: &str = "\n【检索内容结束】\n";
const INSTRUCTION: &str = "请结合以上书籍与笔记内容，提炼与问题相关的洞见并给出回答；\
如果以上内容与问题无关，请明确说明没有找到相关的读书记录。";
const NOTE_DIVIDER: &str = "\n---\n";
const UNKNOWN_AUTHOR: &str = "未知作者";

fn source_label(source: SourceTag) -> &'static str {
    match source {
        SourceTag::Bookshelf => "我的书架",
        SourceTag::BookSearch => "书籍搜索",
        SourceTag::BookNotes => "读书笔记",
        SourceTag::NoteSearch => "笔记搜索",
    }
}

/// Format results as a single delimited block. Empty input gives an empty string.
pub fn format_context(results: &[ToolResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut out = String::from(BLOCK_START);
    for result in results {
        out.push('\n');
        write_header(&mut out, result);
        match &result.content {
            ToolContent::Books { books } => {
                let with_notes = result.source == SourceTag::Bookshelf;
                for (i, book) in books.iter().enumerate() {
                    write_book(&mut out, i + 1, book, with_notes);
                }
            }
            ToolContent::Notes { notes, .. } => {
                let blocks: Vec<String> = notes
                    .iter()
                    .enumerate()
                    .map(|(i, note)| note_block(i + 1, note))
                    .collect();
                out.push_str(&blocks.join(NOTE_DIVIDER));
                if !blocks.is_empty() {
                    out.push('\n');
                }
            }
        }
        for warning in &result.warnings {
            let _ = writeln!(out, "（部分内容未能获取：{warning}）");
        }
    }
    out.push_str(BLOCK_END);
    out.push_str(INSTRUCTION);
    out
}

fn write_header(out: &mut String, result: &ToolResult) {
    let unit = match result.content {
        ToolContent::Books { .. } => "本书",
        ToolContent::Notes { .. } => "条笔记",
    };
    let _ = write!(out, "【{}】共 {} {unit}", source_label(result.source), result.count);
    if let ToolContent::Notes {
        book_name: Some(name),
        ..
    } = &result.content
    {
        let _ = write!(out, "（《{name}》）");
    }
    if let Some(query) = &result.query {
        let _ = write!(out, "（关键词：{query}）");
    }
    out.push('\n');
}

fn write_book(out: &mut String, index: usize, book: &Book, with_notes: bool) {
    let author = book.author.as_deref().unwrap_or(UNKNOWN_AUTHOR);
    let _ = write!(
        out,
        "{index}. 《{}》 - {author} | 划线 {} 条",
        book.title, book.highlight_count
    );
    if with_notes {
        let _ = write!(out, " | 想法 {} 条", book.note_count);
    }
    out.push('\n');
}

fn note_block(index: usize, note: &Note) -> String {
    let mut block = format!("[笔记 {index}]\n");
    if let Some(excerpt) = &note.excerpt {
        let _ = writeln!(block, "摘录：{excerpt}");
    }
    if let Some(thought) = &note.thought {
        let _ = writeln!(block, "想法：{thought}");
    }

    let mut provenance: Vec<String> = Vec::new();
    if let Some(title) = &note.book_title {
        provenance.push(format!("《{title}》"));
    }
    if let Some(chapter) = &note.chapter {
        provenance.push(chapter.clone());
    }
    if let Some(date) = note
        .created_at
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        provenance.push(date.format("%Y-%m-%d").to_string());
    }
    if !provenance.is_empty() {
        let _ = write!(block, "来源：{}", provenance.join(" · "));
    }
    block.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: &str, title: &str, author: Option<&str>) -> Book {
        Book {
            book_id: id.into(),
            title: title.into(),
            author: author.map(Into::into),
            highlight_count: 12,
            note_count: 3,
            cover: None,
        }
    }

    #[test]
    fn empty_results_give_empty_string() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn bookshelf_lists_counts_and_placeholder_author() {
        let result = ToolResult {
            content: ToolContent::Books {
                books: vec![book("b1", "原则", Some("瑞·达利欧")), book("b2", "活着", None)],
            },
            source: SourceTag::Bookshelf,
            count: 2,
            query: None,
            warnings: vec![],
        };
        let text = format_context(&[result]);
        assert!(text.contains("【我的书架】共 2 本书"));
        assert!(text.contains("1. 《原则》 - 瑞·达利欧 | 划线 12 条 | 想法 3 条"));
        assert!(text.contains("2. 《活着》 - 未知作者"));
        assert!(text.ends_with(INSTRUCTION));
    }

    #[test]
    fn book_search_omits_note_count() {
        let result = ToolResult {
            content: ToolContent::Books {
                books: vec![book("b1", "原则", None)],
            },
            source: SourceTag::BookSearch,
            count: 1,
            query: Some("原则".into()),
            warnings: vec![],
        };
        let text = format_context(&[result]);
        assert!(text.contains("（关键词：原则）"));
        assert!(!text.contains("想法 3 条"));
    }

    #[test]
    fn notes_render_blocks_with_provenance() {
        let notes = vec![
            Note {
                book_id: "b1".into(),
                book_title: Some("原则".into()),
                chapter: Some("第一章".into()),
                excerpt: Some("痛苦+反思=进步".into()),
                thought: Some("直面问题".into()),
                created_at: Some(1_700_000_000),
                ..Note::default()
            },
            Note {
                book_id: "b1".into(),
                excerpt: Some("极度透明".into()),
                ..Note::default()
            },
        ];
        let result = ToolResult {
            content: ToolContent::Notes {
                book_name: Some("原则".into()),
                notes,
            },
            source: SourceTag::NoteSearch,
            count: 2,
            query: Some("反思".into()),
            warnings: vec!["《活着》: backend error: timeout".into()],
        };
        let text = format_context(&[result]);
        assert!(text.contains("【笔记搜索】共 2 条笔记"));
        assert!(text.contains("[笔记 1]\n摘录：痛苦+反思=进步\n想法：直面问题\n来源：《原则》 · 第一章 · 2023-11-14"));
        assert!(text.contains("\n---\n[笔记 2]\n摘录：极度透明"));
        assert!(text.contains("部分内容未能获取"));
    }

    #[test]
    fn every_count_appears() {
        let results = vec![
            ToolResult {
                content: ToolContent::Books { books: vec![] },
                source: SourceTag::BookSearch,
                count: 0,
                query: Some("x".into()),
                warnings: vec![],
            },
            ToolResult {
                content: ToolContent::Notes {
                    book_name: None,
                    notes: vec![],
                },
                source: SourceTag::NoteSearch,
                count: 0,
                query: Some("y".into()),
                warnings: vec![],
            },
        ];
        let text = format_context(&results);
        assert!(text.contains("【书籍搜索】共 0 本书"));
        assert!(text.contains("【笔记搜索】共 0 条笔记"));
    }
}
