use std::{cell::RefCell, rc::Rc};

use html_escape::decode_html_entities;
use lol_html::{
    RewriteStrSettings, Selector, doc_text, element, html_content::TextType, rewrite_str, text,
};

const BLOCK_ELEMENTS: &str = "address, article, aside, blockquote, br, dd, div, dl, dt, \
     figcaption, figure, footer, form, h1, h2, h3, h4, h5, h6, header, hr, li, main, nav, \
     ol, p, pre, section, table, td, th, tr, ul";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExtractedPage {
    pub(crate) title: Option<String>,
    pub(crate) text: String,
}

/// Flatten an HTML document into line-oriented text.
///
/// Block elements start a new line, headings and list items keep a light
/// markdown prefix, and script/style content is skipped.
pub(crate) fn extract_text(html: &str) -> Result<ExtractedPage, String> {
    let text = Rc::new(RefCell::new(String::new()));
    let title = Rc::new(RefCell::new(String::new()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(BLOCK_ELEMENTS, {
                    let text = Rc::clone(&text);
                    move |el| {
                        let marker = match el.tag_name().as_str() {
                            "h1" => "\n# ",
                            "h2" => "\n## ",
                            "h3" => "\n### ",
                            "h4" | "h5" | "h6" => "\n#### ",
                            "li" => "\n- ",
                            _ => "\n",
                        };
                        text.borrow_mut().push_str(marker);
                        Ok(())
                    }
                }),
                text!("title", {
                    let title = Rc::clone(&title);
                    move |chunk| {
                        title.borrow_mut().push_str(chunk.as_str());
                        Ok(())
                    }
                }),
            ],
            document_content_handlers: vec![doc_text!({
                let text = Rc::clone(&text);
                move |chunk| {
                    // Title and textarea content arrive as RCDATA; only body text counts.
                    if !matches!(chunk.text_type(), TextType::Data) {
                        return Ok(());
                    }
                    text.borrow_mut().extend(
                        chunk
                            .as_str()
                            .chars()
                            .map(|c| if c.is_whitespace() { ' ' } else { c }),
                    );
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| err.to_string())?;

    let text = normalize_lines(&decode_html_entities(text.borrow().as_str()));
    let title = collapse_spaces(&decode_html_entities(title.borrow().as_str()));

    Ok(ExtractedPage {
        title: (!title.is_empty()).then_some(title),
        text,
    })
}

/// Whether any element in `html` matches a CSS selector.
pub(crate) fn selector_matches(html: &str, selector: &str) -> Result<bool, String> {
    selector
        .parse::<Selector>()
        .map_err(|err| format!("invalid selector `{selector}`: {err}"))?;

    let matched = Rc::new(RefCell::new(false));
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(selector, {
                let matched = Rc::clone(&matched);
                move |_el| {
                    *matched.borrow_mut() = true;
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| err.to_string())?;

    let found = *matched.borrow();
    Ok(found)
}

fn normalize_lines(text: &str) -> String {
    text.split('\n')
        .map(collapse_spaces)
        .filter(|line| !line.is_empty() && !is_bare_marker(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_spaces(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_bare_marker(line: &str) -> bool {
    line == "-" || line.chars().all(|c| c == '#')
}
