//! Integration tests for pagination.
//!
//! Covers:
//! - chapter detection, heading index and outline for a one-chapter book
//! - TOC placement, roman footers and header/footer macros
//! - chapter-relative page numbers on body and contents pages
//! - link index ordering (property test)

use printflow::config::OutputType;
use printflow::layout::{Formatter, LinkIndex, Section};
use printflow::writer::{OutlineBuilder, PlaceholderContext};
use printflow::{CollectingProgress, Document, Element, ExportConfig, ExportSession, FixedMetrics, HeadFootFormat, Node, Style};
use proptest::prelude::*;

fn paragraphs(metrics: &FixedMetrics, count: usize) -> Vec<Node> {
    (0..count)
        .map(|i| {
            Node::block(
                Element::Paragraph,
                &format!("Paragraph {} of a fairly long synthetic body of text.", i),
                Style::default(),
                metrics,
            )
        })
        .collect()
}

mod chapter_tests {
    use super::*;

    #[test]
    fn test_single_h1_chapter() {
        let metrics = FixedMetrics::default();
        let config = ExportConfig::default().with_toc_levels(1).with_toc(false);
        let doc = Document::new(vec![
            Node::block(Element::Heading(1), "Chapter One", Style::default(), &metrics),
            Node::block(Element::Paragraph, "Only a little text.", Style::default(), &metrics),
        ]);
        let mut progress = CollectingProgress::new();
        let result = Formatter::new(&config, &metrics, &mut progress, &doc.images).paginate(&doc);

        assert_eq!(result.headings.len(), 1);
        assert_eq!(result.body_pages.len(), 1);
        let entry = &result.headings.entries()[0];
        assert_eq!(entry.title, "Chapter One");

        let page = result.pages.get(entry.page).unwrap();
        assert_eq!(page.chapter_label.as_deref(), Some("Chapter One"));
        assert_eq!(page.section, Section::Body);
        assert!(entry.y <= page.print_length());
        assert!(entry.y > page.print_length() / 2.0);

        let outline = OutlineBuilder::from_headings(&result.headings, 1, None);
        assert_eq!(outline.len(), 1);
        let item = &outline.items()[0];
        assert_eq!(item.page, entry.page);
        assert_eq!(item.top, entry.y);
    }

    #[test]
    fn test_each_h1_starts_a_page() {
        let metrics = FixedMetrics::default();
        let config = ExportConfig::default().with_toc(false);
        let mut nodes = Vec::new();
        for title in ["One", "Two", "Three"] {
            nodes.push(Node::block(Element::Heading(1), title, Style::default(), &metrics));
            nodes.extend(paragraphs(&metrics, 2));
        }
        let doc = Document::new(nodes);
        let mut progress = CollectingProgress::new();
        let result = Formatter::new(&config, &metrics, &mut progress, &doc.images).paginate(&doc);

        let pages: Vec<usize> = result.headings.entries().iter().map(|h| h.page).collect();
        assert_eq!(pages.len(), 3);
        assert!(pages.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(result.chapter_starts.len(), 4);
    }

    #[test]
    fn test_long_body_spans_pages() {
        let metrics = FixedMetrics::default();
        let config = ExportConfig::default().with_output_type(OutputType::WebPages);
        let doc = Document::new(paragraphs(&metrics, 200));
        let mut progress = CollectingProgress::new();
        let result = Formatter::new(&config, &metrics, &mut progress, &doc.images).paginate(&doc);

        assert!(result.page_count() > 3);
        for page in result.pages.iter() {
            for prim in page.primitives().iter().filter(|p| p.is_text()) {
                assert!(prim.rect.y >= -0.01, "primitive below the printable area");
                assert!(prim.rect.top() <= page.print_length() + 0.01);
            }
        }
    }
}

mod toc_tests {
    use super::*;

    #[test]
    fn test_toc_pages_are_roman() {
        let metrics = FixedMetrics::default();
        let config = ExportConfig::default();
        let mut nodes = Vec::new();
        for title in ["Alpha", "Beta"] {
            nodes.push(Node::block(Element::Heading(1), title, Style::default(), &metrics));
            nodes.extend(paragraphs(&metrics, 3));
        }
        let doc = Document::new(nodes).with_title("Roman");
        let mut session = ExportSession::new(&config, &metrics);
        let result = session.paginate(&doc).unwrap();

        assert_eq!(result.page_order[0], result.toc_pages.start);
        let toc = result.pages.get(result.toc_pages.start).unwrap();
        // Default TOC footer is "$PAGE(i)" on the right.
        assert!(toc.primitives().iter().any(|p| matches!(
            &p.kind,
            printflow::layout::PrimitiveKind::Text { text, .. } if text == "i"
        )));
    }

    /// Text of the footer run on a page (footers sit on the bottom edge).
    fn footer_text(page: &printflow::layout::Page) -> Option<String> {
        page.primitives().iter().find_map(|p| match &p.kind {
            printflow::layout::PrimitiveKind::Text { text, .. } if p.rect.y == 0.0 => Some(text.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_chapter_page_numbers_across_chapters_and_toc() {
        let metrics = FixedMetrics::default();
        let mut config = ExportConfig::default()
            .with_header(HeadFootFormat::default())
            .with_footer(HeadFootFormat::new("", "$CHAPTERPAGE", ""));
        config.toc_header = HeadFootFormat::default();
        config.toc_footer = HeadFootFormat::new("", "$CHAPTERPAGE", "");

        let mut nodes = vec![Node::block(Element::Heading(1), "Alpha", Style::default(), &metrics)];
        nodes.extend(paragraphs(&metrics, 40));
        nodes.push(Node::block(Element::Heading(1), "Beta", Style::default(), &metrics));
        nodes.extend(paragraphs(&metrics, 3));
        let doc = Document::new(nodes).with_title("Chapters");
        let mut session = ExportSession::new(&config, &metrics);
        let result = session.paginate(&doc).unwrap();

        assert_eq!(result.chapter_starts.len(), 3);
        assert_eq!(result.chapter_starts[1], result.body_pages.start);
        let alpha = result.chapter_starts[1]..result.chapter_starts[2];
        assert!(alpha.len() >= 2, "first chapter should span pages");

        // Chapter-relative numbers restart with each chapter.
        let body: Vec<String> = result
            .body_pages
            .clone()
            .map(|i| footer_text(result.pages.get(i).unwrap()).unwrap())
            .collect();
        let mut expected: Vec<String> = (1..=alpha.len()).map(|n| n.to_string()).collect();
        expected.extend((1..=result.body_pages.end - result.chapter_starts[2]).map(|n| n.to_string()));
        assert_eq!(body, expected);

        // Contents pages are numbered as if they followed the body.
        assert!(!result.toc_pages.is_empty());
        let body_count = result.body_pages.len() as i64;
        for (n, index) in result.toc_pages.clone().enumerate() {
            let text = footer_text(result.pages.get(index).unwrap()).unwrap();
            assert_eq!(text, (n as i64 + 1 - body_count).to_string());
        }
    }

    #[test]
    fn test_placeholder_context_resolution() {
        let ctx = PlaceholderContext {
            page: 4,
            pages: 12,
            title: Some("Guide"),
            ..Default::default()
        };
        assert_eq!(printflow::writer::resolve("$TITLE - $PAGE/$PAGES", &ctx), "Guide - 4/12");
        assert_eq!(printflow::writer::resolve("$PAGE(I)", &ctx), "IV");
    }
}

proptest! {
    #[test]
    fn prop_link_index_sorted_and_unique(names in prop::collection::vec("[A-Za-z]{1,8}", 1..60)) {
        let mut index = LinkIndex::new(1000);
        for (i, name) in names.iter().enumerate() {
            index.add(name, i, 100.0);
        }
        let links = index.links();
        for pair in links.windows(2) {
            prop_assert!(pair[0].name.to_lowercase() < pair[1].name.to_lowercase());
        }
        for name in &names {
            prop_assert!(index.find(&name.to_uppercase()).is_some());
        }
    }
}
