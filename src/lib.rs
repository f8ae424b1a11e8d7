//! # gemini-chat-export
//!
//! Exports Gemini web chat conversations from saved HTML pages to Markdown,
//! plain text or JSON.
//!
//! ## What it does
//!
//! The chat UI renders each turn as a `<user-query>` or `<model-response>`
//! element full of framework markup: toolbars, copy buttons, "Show thinking"
//! toggles. This crate finds those elements in page order, cuts the
//! interface chrome out of a private copy of each one, and renders what is
//! left back into Markdown: headings, emphasis, fenced code with its
//! language, nested lists and blockquotes.
//!
//! ```
//! use gemini_chat_export::extract::extract_html;
//! use gemini_chat_export::locator::Role;
//!
//! let page = r#"<user-query><p>Hi</p></user-query>
//!               <model-response><p>Hello <b>there</b></p><button>Copy</button></model-response>"#;
//! let extraction = extract_html(page).unwrap();
//! assert_eq!(extraction.entries[0].role(), Role::Submitted);
//! assert_eq!(extraction.entries[1].text(), "Hello **there**");
//! ```
//!
//! ## Usage
//!
//! ```sh
//! # Export saved pages to a directory
//! gemini-chat-export chat1.html chat2.html --out ~/notes/gemini
//!
//! # Pipe a page through and get plain text back
//! gemini-chat-export --format text < chat.html
//! ```
//!
//! Preferences can be persisted in `~/.config/gemini-chat-export/config.toml`.
pub mod converter;
pub mod dom;
pub mod error;
pub mod exporter;
pub mod extract;
pub mod locator;
pub mod utils;
