//! Markdown rendering of a single message element.
//!
//! [`convert`] works on its own copy of the element: UI chrome is cut out of
//! the copy, the remaining tree is rendered depth-first into Markdown, known
//! button captions are stripped from the ends of the text, and whitespace is
//! normalized. The input element is never modified.

use crate::dom::{Element, Node, Selector};
use crate::error::ConvertError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;
use std::fmt::Write;

/// Deepest element nesting [`convert`] will render.
pub const MAX_RENDER_DEPTH: usize = 512;

/// Subtrees that never carry message content.
const NON_CONTENT: &[Selector] = &[
    Selector::Tag("script"),
    Selector::Tag("style"),
    Selector::Tag("noscript"),
    Selector::Tag("template"),
    Selector::Tag("svg"),
    Selector::Tag("button"),
    Selector::Tag("mat-icon"),
    Selector::Tag("message-actions"),
    Selector::Tag("model-thoughts"),
    Selector::AttrEquals("role", "toolbar"),
    Selector::AttrEquals("role", "button"),
    Selector::ClassContains("toolbar"),
    Selector::ClassContains("action-button"),
    Selector::ClassContains("actions-container"),
    Selector::ClassContains("message-actions"),
    Selector::ClassContains("copy-button"),
    Selector::ClassContains("feedback"),
    Selector::ClassContains("thoughts"),
    Selector::ClassContains("thinking"),
    Selector::AttrContains("data-test-id", "thoughts"),
];

const BLOCK_CONTAINERS: &[&str] = &[
    "div",
    "section",
    "article",
    "header",
    "footer",
    "main",
    "aside",
    "nav",
    "figure",
    "figcaption",
    "details",
    "summary",
];

const LANGUAGE_PREFIXES: &[&str] = &["language-", "lang-", "hljs-"];

const ACTION_LABELS: &[&str] = &[
    "Copy",
    "Copy code",
    "Copy text",
    "Share",
    "Share & export",
    "Edit",
    "Edit text",
    "Regenerate",
    "Regenerate draft",
    "Retry",
    "Show drafts",
    "Good response",
    "Bad response",
    "More options",
    "コピー",
    "コードをコピー",
    "共有",
    "共有とエクスポート",
    "編集",
    "テキストを編集",
    "再生成",
    "回答を再生成",
    "Kopieren",
    "Code kopieren",
    "Teilen",
    "Bearbeiten",
    "Neu generieren",
    "Copier",
    "Copier le code",
    "Partager",
    "Modifier",
    "Régénérer",
    "Copiar",
    "Copiar código",
    "Compartir",
    "Editar",
    "Regenerar",
    "复制",
    "分享",
    "编辑",
    "重新生成",
];

const THINKING_LABELS: &[&str] = &[
    "Show thinking",
    "Hide thinking",
    "Thinking",
    "Thinking process",
    "思考プロセスを表示",
    "思考プロセスを非表示",
    "思考プロセス",
    "Gedankengang anzeigen",
    "Afficher le raisonnement",
    "Mostrar razonamiento",
    "显示思路",
];

/// Ordered removals: thinking label as prefix, as suffix, then action labels.
static BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    let thinking = alternation(THINKING_LABELS);
    let actions = alternation(ACTION_LABELS);
    [
        leading_line(&thinking),
        trailing_line(&thinking),
        leading_line(&actions),
        trailing_line(&actions),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("boilerplate patterns are valid"))
    .collect()
});

static SPACE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+").expect("space pattern is valid"));

// Longest labels first: the regex alternation is leftmost-first.
fn alternation(labels: &[&str]) -> String {
    let mut labels = labels.to_vec();
    labels.sort_by_key(|label| Reverse(label.len()));
    labels
        .iter()
        .map(|label| regex::escape(label))
        .collect::<Vec<_>>()
        .join("|")
}

fn leading_line(alternation: &str) -> String {
    format!(r"\A\s*(?:{alternation})[ \t]*(?:\r?\n|\z)")
}

fn trailing_line(alternation: &str) -> String {
    format!(r"(?:\A|\n)[ \t]*(?:{alternation})\s*\z")
}

/// Convert one message element into cleaned Markdown text.
pub fn convert(element: &Element) -> Result<String, ConvertError> {
    let mut owned = element.clone();
    owned.remove_descendants(&|el: &Element| el.matches_any(NON_CONTENT));
    let rendered = render_children(&owned, 0)?;
    Ok(clean_text(&rendered))
}

/// Strip boilerplate labels and normalize whitespace until the text is stable.
pub fn clean_text(text: &str) -> String {
    let mut current = normalize_whitespace(&strip_boilerplate(text));
    loop {
        let next = normalize_whitespace(&strip_boilerplate(&current));
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Remove interface labels that form the whole first or whole last line.
pub fn strip_boilerplate(text: &str) -> String {
    BOILERPLATE.iter().fold(text.to_string(), |acc, re| {
        re.replace(&acc, "").into_owned()
    })
}

/// Collapse blank-line runs and interior space runs, leaving fenced code alone.
pub fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut fence: Option<usize> = None;

    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let body = raw.trim_start_matches([' ', '\t']);

        let line = if body.is_empty() {
            String::new()
        } else if fence.is_some() {
            raw.to_string()
        } else {
            let indent = &raw[..raw.len() - body.len()];
            let body = SPACE_RUNS.replace_all(body.trim_end_matches([' ', '\t']), " ");
            format!("{indent}{body}")
        };
        fence = next_fence_state(fence, body);

        if line.is_empty() && lines.last().is_some_and(|prev| prev.is_empty()) {
            continue;
        }
        lines.push(line);
    }

    lines.join("\n").trim().to_string()
}

fn fence_marker(line: &str) -> Option<usize> {
    let ticks = line.len() - line.trim_start_matches('`').len();
    (ticks >= 3).then_some(ticks)
}

fn next_fence_state(fence: Option<usize>, body: &str) -> Option<usize> {
    match fence {
        None => fence_marker(body),
        Some(open) => match fence_marker(body) {
            Some(ticks) if ticks >= open && body.trim_end().len() == ticks => None,
            _ => Some(open),
        },
    }
}

pub(crate) fn render_children(el: &Element, depth: usize) -> Result<String, ConvertError> {
    if depth > MAX_RENDER_DEPTH {
        return Err(ConvertError::TooDeep {
            limit: MAX_RENDER_DEPTH,
        });
    }
    let mut out = String::new();
    for child in el.children() {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) => render_element(child, depth + 1, &mut out)?,
        }
    }
    Ok(out)
}

fn render_element(el: &Element, depth: usize, out: &mut String) -> Result<(), ConvertError> {
    match el.tag() {
        "pre" => {
            let block = render_pre(el);
            if !block.is_empty() {
                start_line(out);
                out.push_str(&block);
            }
        }
        "code" => out.push_str(&inline_code(&el.text_content())),
        "br" => out.push('\n'),
        "p" => {
            start_line(out);
            out.push_str(&render_children(el, depth)?);
            out.push_str("\n\n");
        }
        "span" => out.push_str(&render_children(el, depth)?),
        "b" | "strong" => out.push_str(&emphasize(&render_children(el, depth)?, "**")),
        "i" | "em" => out.push_str(&emphasize(&render_children(el, depth)?, "*")),
        tag @ ("h1" | "h2" | "h3" | "h4" | "h5" | "h6") => {
            let level = tag[1..].parse::<usize>().unwrap_or(1);
            let inner = render_children(el, depth)?;
            let inner = inner
                .split('\n')
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !inner.is_empty() {
                start_line(out);
                let _ = write!(out, "{} {}\n\n", "#".repeat(level), inner);
            }
        }
        "ul" | "ol" => {
            let list = render_list(el, el.tag() == "ol", depth)?;
            if !list.is_empty() {
                start_line(out);
                out.push_str(&list);
                out.push('\n');
            }
        }
        // Items only render through their list.
        "li" => {}
        "blockquote" => {
            let inner = render_children(el, depth)?;
            let inner = inner.trim();
            if !inner.is_empty() {
                start_line(out);
                for line in inner.split('\n') {
                    out.push_str("> ");
                    out.push_str(line);
                    out.push('\n');
                }
                out.push('\n');
            }
        }
        tag if BLOCK_CONTAINERS.contains(&tag) => {
            let inner = render_children(el, depth)?;
            if !inner.trim().is_empty() {
                start_line(out);
                out.push_str(&inner);
                out.push('\n');
            }
        }
        _ => out.push_str(&render_children(el, depth)?),
    }
    Ok(())
}

// Block output never continues a line of inline text.
fn start_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Render the `<li>` children of a list. Items whose content is blank are
/// skipped and do not consume a number; ordered lists always count from 1.
pub(crate) fn render_list(
    list: &Element,
    ordered: bool,
    depth: usize,
) -> Result<String, ConvertError> {
    let mut out = String::new();
    let mut number = 0;

    for item in list.child_elements().filter(|c| c.tag() == "li") {
        let content = render_children(item, depth + 1)?;
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        number += 1;

        let mut lines = content.split('\n');
        if let Some(first) = lines.next() {
            if ordered {
                let _ = writeln!(out, "{number}. {first}");
            } else {
                let _ = writeln!(out, "- {first}");
            }
        }
        for line in lines.filter(|line| !line.trim().is_empty()) {
            let _ = writeln!(out, "  {line}");
        }
    }
    Ok(out)
}

fn render_pre(pre: &Element) -> String {
    let (language, code) = match pre.find_descendant("code") {
        Some(code) => (code_language(code), code.text_content()),
        None => ("", pre.text_content()),
    };
    let code = code.trim();
    if code.is_empty() {
        return String::new();
    }
    let fence = fence_for(code);
    format!("{fence}{language}\n{code}\n{fence}\n\n")
}

fn code_language(code: &Element) -> &str {
    code.class_list()
        .find_map(|class| {
            LANGUAGE_PREFIXES
                .iter()
                .find_map(|prefix| class.strip_prefix(*prefix))
        })
        .unwrap_or_default()
}

// One backtick longer than any run inside the code, and at least three.
fn fence_for(code: &str) -> String {
    let longest = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn inline_code(text: &str) -> String {
    if text.trim().is_empty() {
        text.to_string()
    } else if text.contains('`') {
        format!("`` {text} ``")
    } else {
        format!("`{text}`")
    }
}

// Surrounding whitespace stays outside the markers so `** x**` never happens.
fn emphasize(content: &str, marker: &str) -> String {
    let inner = content.trim();
    if inner.is_empty() {
        return content.to_string();
    }
    let start = content.len() - content.trim_start().len();
    let end = start + inner.len();
    format!(
        "{}{marker}{inner}{marker}{}",
        &content[..start],
        &content[end..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Selector, parse_html, select_all};

    fn el(tag: &str) -> Element {
        Element::new(tag)
    }

    fn body_of(html: &str) -> Element {
        let root = parse_html(html);
        select_all(&root, &[Selector::Tag("body")]).unwrap()[0].clone()
    }

    #[test]
    fn test_code_block_with_language() {
        let pre = el("pre").with_child(
            el("code")
                .with_class("language-python")
                .with_text("print(1)"),
        );
        let wrapper = el("div").with_child(pre);
        assert_eq!(
            render_children(&wrapper, 0).unwrap(),
            "```python\nprint(1)\n```\n\n"
        );
        assert_eq!(convert(&wrapper).unwrap(), "```python\nprint(1)\n```");
    }

    #[test]
    fn test_code_block_from_html() {
        let body = body_of(r#"<pre><code class="language-python">print(1)</code></pre>"#);
        assert_eq!(convert(&body).unwrap(), "```python\nprint(1)\n```");
    }

    #[test]
    fn test_code_language_prefixes() {
        let body = body_of(
            r#"<pre><code class="hljs lang-rust">fn main() {}</code></pre>
               <pre><code class="hljs-go">package main</code></pre>
               <pre><code class="plain">x</code></pre>"#,
        );
        assert_eq!(
            convert(&body).unwrap(),
            "```rust\nfn main() {}\n```\n\n```go\npackage main\n```\n\n```\nx\n```"
        );
    }

    #[test]
    fn test_pre_without_code_and_empty_code() {
        let body = body_of("<pre>  plain text  </pre><pre><code>   </code></pre>");
        assert_eq!(convert(&body).unwrap(), "```\nplain text\n```");
    }

    #[test]
    fn test_fence_grows_past_backticks_in_code() {
        let pre = el("pre").with_child(el("code").with_text("a ``` b"));
        let out = convert(&el("div").with_child(pre)).unwrap();
        assert_eq!(out, "````\na ``` b\n````");
    }

    #[test]
    fn test_code_inside_pre_is_not_wrapped_twice() {
        let pre = el("pre").with_child(el("code").with_text("let x = 1;"));
        let out = convert(&el("div").with_child(pre)).unwrap();
        assert!(!out.contains("`let"));
    }

    #[test]
    fn test_inline_code() {
        let body = body_of("<p>Run <code>cargo build</code> now</p>");
        assert_eq!(convert(&body).unwrap(), "Run `cargo build` now");
        assert_eq!(inline_code("a`b"), "`` a`b ``");
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let body = body_of("<h2>Title</h2><p>Body</p><h6> Small </h6>");
        assert_eq!(convert(&body).unwrap(), "## Title\n\nBody\n\n###### Small");
    }

    #[test]
    fn test_heading_stays_on_one_line() {
        let body = body_of("<h2>a<br>b</h2><h3>\n  <span>x</span>\n  <b>y</b>\n</h3>");
        assert_eq!(convert(&body).unwrap(), "## a b\n\n### x **y**");
    }

    #[test]
    fn test_line_breaks_between_inline_elements_separate_words() {
        let body = body_of("<p><strong>a</strong>\n  <em>b</em></p>");
        assert_eq!(convert(&body).unwrap(), "**a** *b*");

        let body = body_of("<p><strong>Bold</strong>\n    <em>it</em>\n    <code>x</code></p>");
        assert_eq!(convert(&body).unwrap(), "**Bold** *it* `x`");
    }

    #[test]
    fn test_emphasis() {
        let body = body_of("<p>a <strong>bold </strong><em>it</em> <b></b>c</p>");
        assert_eq!(convert(&body).unwrap(), "a **bold** *it* c");
    }

    #[test]
    fn test_line_break() {
        let body = body_of("<p>one<br>two</p>");
        assert_eq!(convert(&body).unwrap(), "one\ntwo");
    }

    #[test]
    fn test_div_uses_single_newline_and_paragraph_double() {
        let divs = el("div")
            .with_child(el("div").with_text("a"))
            .with_child(el("div").with_text("b"));
        assert_eq!(convert(&divs).unwrap(), "a\nb");

        let paragraphs = el("div")
            .with_child(el("p").with_text("a"))
            .with_child(el("p").with_text("b"));
        assert_eq!(convert(&paragraphs).unwrap(), "a\n\nb");
    }

    #[test]
    fn test_blank_div_adds_nothing() {
        let body = el("div")
            .with_child(el("span").with_text("x"))
            .with_child(el("div").with_text("  "))
            .with_child(el("span").with_text("y"));
        assert_eq!(convert(&body).unwrap(), "xy");
    }

    #[test]
    fn test_list_item_with_continuation() {
        let ul = el("ul").with_child(
            el("li")
                .with_child(el("p").with_text("first"))
                .with_child(el("p").with_text("second")),
        );
        assert_eq!(render_list(&ul, false, 0).unwrap(), "- first\n  second\n");
        assert_eq!(convert(&el("div").with_child(ul)).unwrap(), "- first\n  second");
    }

    #[test]
    fn test_ordered_list_skips_empty_items_and_ignores_start() {
        let ol = el("ol")
            .with_attr("start", "5")
            .with_child(el("li").with_text("a"))
            .with_child(el("li"))
            .with_child(el("li").with_text("   "))
            .with_child(el("li").with_text("b"));
        assert_eq!(convert(&el("div").with_child(ol)).unwrap(), "1. a\n2. b");
    }

    #[test]
    fn test_nested_list() {
        let body = body_of("<ul><li>top<ul><li>inner</li></ul></li><li>next</li></ul>");
        assert_eq!(convert(&body).unwrap(), "- top\n  - inner\n- next");
    }

    #[test]
    fn test_list_item_outside_list_is_silent() {
        let div = el("div").with_child(el("li").with_text("stray"));
        assert_eq!(convert(&div).unwrap(), "");
    }

    #[test]
    fn test_blockquote() {
        let body = body_of("<blockquote><p>quoted</p><p>more</p></blockquote><p>after</p>");
        assert_eq!(convert(&body).unwrap(), "> quoted\n>\n> more\n\nafter");
    }

    #[test]
    fn test_interface_chrome_is_removed() {
        let body = body_of(
            r#"<model-thoughts>Thinking about it</model-thoughts>
               <p>Answer</p>
               <button>Copy</button>
               <div class="action-buttons"><span>Share</span></div>
               <div data-test-id="thoughts-header">Show thinking</div>
               <script>var x = 1;</script><style>p { color: red }</style>"#,
        );
        assert_eq!(convert(&body).unwrap(), "Answer");
    }

    #[test]
    fn test_boilerplate_is_only_removed_at_the_edges() {
        assert_eq!(clean_text("Copy"), "");
        assert_eq!(
            clean_text("Please Copy this code below"),
            "Please Copy this code below"
        );
        assert_eq!(clean_text("Show thinking\nReal answer\nCopy"), "Real answer");
        assert_eq!(clean_text("Answer\n\nShare\nEdit"), "Answer");
        assert_eq!(clean_text("コピー\n回答"), "回答");
        assert_eq!(clean_text("Copy that, thanks"), "Copy that, thanks");
    }

    #[test]
    fn test_whitespace_normalization() {
        assert_eq!(normalize_whitespace("a  \t b\n \t \n\n\n\nc  "), "a b\n\nc");
        assert_eq!(normalize_whitespace("- a\n    b   c"), "- a\n    b c");
        assert_eq!(
            normalize_whitespace("```\nx    y\n\n\n\nz\n```\n\n\nafter"),
            "```\nx    y\n\nz\n```\n\nafter"
        );
    }

    #[test]
    fn test_convert_is_idempotent() {
        let body = body_of("<h1>T</h1><ul><li>a<p>b</p></li></ul><pre><code>x  y</code></pre>");
        let once = convert(&body).unwrap();
        let again = convert(&el("div").with_text(once.clone())).unwrap();
        assert_eq!(once, again);
    }

    #[test]
    fn test_convert_leaves_input_untouched() {
        let body = body_of("<p>keep</p><button>Copy</button><div class=\"toolbar\">x</div>");
        let snapshot = body.clone();
        let _ = convert(&body).unwrap();
        assert_eq!(body, snapshot);
    }

    #[test]
    fn test_excessive_nesting_is_an_error() {
        let mut inner = el("span").with_text("deep");
        for _ in 0..MAX_RENDER_DEPTH + 1 {
            inner = el("span").with_child(inner);
        }
        let err = convert(&el("div").with_child(inner)).unwrap_err();
        assert!(matches!(err, ConvertError::TooDeep { .. }));
    }
}
