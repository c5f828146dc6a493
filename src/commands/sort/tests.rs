use std::cell::Cell;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Result, bail};
use lopdf::{Document, Object, Stream, dictionary};

use crate::cli::{FallbackCriterion, OcrMode, RunMode, SortArgs, SummaryDetector};
use crate::matcher::{IdentifierMatcher, MatchRule};
use crate::reference::ReferenceTable;

use super::assemble::{COMBINED_LABELS_FILE, UNCLASSIFIED_LABELS_FILE, write_page_subset};
use super::buckets::{Bucket, BucketAccumulator, Classification, ExtractionTrace, PageOutcome, Resolution};
use super::candidates::{CandidateExtractor, partial_score};
use super::classify::{
    ClassifierSettings, NO_IDENTIFIER, OCR_EMPTY, OCR_UNAVAILABLE, PageClassifier,
};
use super::extract::{ExtractedPage, OcrEngine, PageExtractor, page_has_marks};
use super::routes::{RouteCode, RouteLabel, RouteTable};
use super::run::{OutputOptions, SortOutcome, process, render_sort_command};
use super::sort_key::{LabelSortKey, PatternKey, SortKeyEngine};
use super::summary::{SummaryKey, SummaryRules};

struct FakeExtractor {
    pages: Vec<ExtractedPage>,
}

impl PageExtractor for FakeExtractor {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn extract(&self, page_index: usize) -> Result<ExtractedPage> {
        match self.pages.get(page_index) {
            Some(page) => Ok(page.clone()),
            None => bail!("no page {page_index}"),
        }
    }
}

/// Replays one scripted result per call; `Err` entries become OCR errors.
struct ScriptedOcr {
    outputs: Vec<std::result::Result<String, String>>,
    calls: Cell<usize>,
}

impl ScriptedOcr {
    fn new(outputs: Vec<std::result::Result<&str, &str>>) -> Self {
        Self {
            outputs: outputs
                .into_iter()
                .map(|output| output.map(str::to_string).map_err(str::to_string))
                .collect(),
            calls: Cell::new(0),
        }
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, _page_index: usize, _dpi: u32, _config: &str) -> Result<String> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        match self.outputs.get(call) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(message)) => bail!("{message}"),
            None => Ok(String::new()),
        }
    }
}

fn text_page(text: &str) -> ExtractedPage {
    ExtractedPage {
        text: text.to_string(),
        has_visual_content: true,
    }
}

fn image_page() -> ExtractedPage {
    ExtractedPage {
        text: String::new(),
        has_visual_content: true,
    }
}

fn blank_page() -> ExtractedPage {
    ExtractedPage::default()
}

fn settings(mode: RunMode) -> ClassifierSettings {
    ClassifierSettings {
        mode,
        summary_detector: SummaryDetector::Loose,
        fallback_order: FallbackCriterion::default_order(),
        ocr_dpi: 120,
        ocr_configs: vec!["--psm 6 --oem 1".to_string(), "--psm 4 --oem 1".to_string()],
    }
}

struct Fixture {
    settings: ClassifierSettings,
    matcher: IdentifierMatcher,
    table: ReferenceTable,
    routes: RouteTable,
}

impl Fixture {
    fn new(mode: RunMode) -> Self {
        Self::with_table(mode, ReferenceTable::builtin())
    }

    fn with_table(mode: RunMode, table: ReferenceTable) -> Self {
        Self {
            settings: settings(mode),
            matcher: IdentifierMatcher::new().expect("matcher regexes compile"),
            table,
            routes: RouteTable::standard().expect("route regexes compile"),
        }
    }

    fn classifier<'a>(&'a self, ocr: Option<&'a dyn OcrEngine>) -> PageClassifier<'a> {
        PageClassifier::new(&self.settings, &self.matcher, &self.table, &self.routes, ocr)
            .expect("classifier rules compile")
    }

    fn classify_text(&self, text: &str) -> Classification {
        self.classifier(None).classify(0, &text_page(text)).classification
    }

    fn process(&self, pages: Vec<ExtractedPage>, options: &OutputOptions) -> SortOutcome {
        let markers = (1..=pages.len())
            .map(|number| format!("P{number}"))
            .collect::<Vec<_>>();
        let markers = markers.iter().map(String::as_str).collect::<Vec<_>>();
        let document = document_with_pages(&markers);
        let extractor = FakeExtractor { pages };
        process(
            &document,
            &extractor,
            None,
            &self.table,
            &self.matcher,
            &self.settings,
            options,
        )
        .expect("process succeeds")
    }
}

fn dry_run() -> OutputOptions {
    OutputOptions {
        output_dir: std::env::temp_dir().join("labelsort_dry_run_unused"),
        split_label_buckets: false,
        dry_run: true,
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "labelsort_sort_{}_{}",
        name,
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

/// Pages share MediaBox and Resources through the page tree root. An empty
/// marker produces a page with an empty content stream.
fn document_with_pages(markers: &[&str]) -> Document {
    let mut doc = Document::with_version("1.5");

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for marker in markers {
        let content = if marker.is_empty() {
            Vec::new()
        } else {
            format!("BT /F1 12 Tf 72 720 Td ({marker}) Tj ET").into_bytes()
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc
}

fn page_contents(document: &Document) -> Vec<String> {
    document
        .get_pages()
        .values()
        .map(|page_id| {
            let content = document.get_page_content(*page_id).expect("page content");
            String::from_utf8_lossy(&content).to_string()
        })
        .collect()
}

#[test]
fn route_label_lands_in_915_bucket() {
    let fixture = Fixture::new(RunMode::Route);
    assert_eq!(
        fixture.classify_text("SHIP TO\nWZ-101-ABC\n"),
        Classification::Route {
            code: RouteCode::R915,
            label: RouteLabel::Numbered {
                prefix: "WZ".to_string(),
                number: 101,
                suffix: "ABC".to_string(),
            },
        }
    );
}

#[test]
fn rowed_route_labels_split_by_prefix() {
    let fixture = Fixture::new(RunMode::Route);

    let classification = fixture.classify_text("AA-AB-12");
    assert_eq!(classification.bucket(), Bucket::Route(RouteCode::R8090));

    match fixture.classify_text("GB-AC-07") {
        Classification::Route { code, label } => {
            assert_eq!(code, RouteCode::R60);
            assert_eq!(label.render(), "GB-AC-7");
        }
        other => panic!("expected route 60, got {other:?}"),
    }

    assert_eq!(fixture.classify_text("ZZ-AB-12").bucket(), Bucket::Unclassified);
}

#[test]
fn numbered_route_with_unknown_prefix_is_unclassified() {
    let fixture = Fixture::new(RunMode::Route);
    assert_eq!(
        fixture.classify_text("QQ-101-X AA-AB-12").bucket(),
        Bucket::Unclassified
    );
}

#[test]
fn blank_page_goes_only_to_blank_output() {
    let fixture = Fixture::new(RunMode::Route);
    let outcome = fixture.classifier(None).classify(0, &blank_page());
    assert_eq!(outcome.classification, Classification::Blank);

    let dir = scratch_dir("blank_only");
    let options = OutputOptions {
        output_dir: dir.clone(),
        split_label_buckets: false,
        dry_run: false,
    };
    let result = fixture.process(vec![blank_page()], &options);

    assert_eq!(result.written, vec![dir.join("blank.pdf")]);
    let written = Document::load(dir.join("blank.pdf")).expect("load blank.pdf");
    assert_eq!(written.get_pages().len(), 1);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn opac_nine_resolves_to_six_in_label_mode() {
    let fixture = Fixture::new(RunMode::Label);
    match fixture.classify_text("ALIGN\n048-OPAC-9H\nQTY 1") {
        Classification::Matched {
            identifier,
            resolution,
            ..
        } => {
            assert_eq!(identifier, "048-OPAC-6H");
            assert_eq!(resolution, Resolution::Matched(MatchRule::Substitution));
        }
        other => panic!("expected matched label, got {other:?}"),
    }
}

#[test]
fn image_only_label_without_ocr_sorts_after_matched_pages() {
    let fixture = Fixture::new(RunMode::Label);
    let pages = vec![text_page("048-OPAC-6"), image_page(), text_page("TFO1S-BK")];

    let classifier = fixture.classifier(None);
    assert_eq!(
        classifier.classify(1, &pages[1]).classification,
        Classification::Unmatched {
            reason: OCR_UNAVAILABLE.to_string(),
            snippet: String::new(),
        }
    );

    let outcome = fixture.process(pages, &dry_run());
    let combined = &outcome.plans[0];
    assert_eq!(combined.file_name, COMBINED_LABELS_FILE);
    assert_eq!(combined.pages, vec![0, 2, 1]);
    assert!(outcome.written.is_empty());
}

#[test]
fn summary_page_keyed_by_order_number() {
    let fixture = Fixture::new(RunMode::Label);
    match fixture.classify_text("Total 12 Labels SO# 4821") {
        Classification::Summary { key, .. } => assert_eq!(key, SummaryKey::OrderNumber(4821)),
        other => panic!("expected summary page, got {other:?}"),
    }
}

#[test]
fn summary_pages_are_only_detected_in_label_mode() {
    let fixture = Fixture::new(RunMode::Route);
    assert_eq!(
        fixture.classify_text("Total 12 Labels SO# 4821").bucket(),
        Bucket::Unclassified
    );
}

#[test]
fn summary_detectors_stay_separate() {
    let loose = SummaryRules::new(SummaryDetector::Loose).expect("loose rules");
    let strict = SummaryRules::new(SummaryDetector::Strict).expect("strict rules");

    assert!(loose.is_summary("ups: 4 labels"));
    assert!(loose.is_summary("Single Item Label"));
    assert!(!loose.is_summary("ALIGN UPS12L FSO"));

    assert!(strict.is_summary("ALIGN UPS12L FSO"));
    assert!(!strict.is_summary("ALIGN UPS12L FSO 048-OPAC-6H"));
    assert!(!strict.is_summary("Total 12 Labels"));
}

#[test]
fn summary_keys_order_numbers_before_counts() {
    let rules = SummaryRules::new(SummaryDetector::Loose).expect("rules");
    assert_eq!(rules.key("UPS: 12 Labels"), SummaryKey::Count(12));
    assert_eq!(rules.key("total 7 labels"), SummaryKey::Count(7));
    assert_eq!(rules.key("single label"), SummaryKey::Unkeyed);

    let mut keys = vec![
        SummaryKey::Unkeyed,
        SummaryKey::Count(1),
        SummaryKey::OrderNumber(9),
    ];
    keys.sort();
    assert_eq!(
        keys,
        vec![
            SummaryKey::OrderNumber(9),
            SummaryKey::Count(1),
            SummaryKey::Unkeyed
        ]
    );
}

#[test]
fn ocr_tries_configs_until_text_appears() {
    let fixture = Fixture::new(RunMode::Label);
    let ocr = ScriptedOcr::new(vec![Ok("  "), Ok("048-TL-W6KWD")]);
    let outcome = fixture.classifier(Some(&ocr)).classify(0, &image_page());

    assert_eq!(ocr.calls.get(), 2);
    assert_eq!(outcome.trace.backend, "ocr");
    assert_eq!(outcome.trace.ocr_config.as_deref(), Some("--psm 4 --oem 1"));
    match outcome.classification {
        Classification::Matched { identifier, .. } => assert_eq!(identifier, "048-TL-W6KWD"),
        other => panic!("expected matched label, got {other:?}"),
    }
}

#[test]
fn ocr_empty_and_failed_pages_get_placeholders() {
    let fixture = Fixture::new(RunMode::Label);

    let empty = ScriptedOcr::new(vec![Ok(""), Ok("\n")]);
    let outcome = fixture.classifier(Some(&empty)).classify(0, &image_page());
    assert_eq!(
        outcome.classification,
        Classification::Unmatched {
            reason: OCR_EMPTY.to_string(),
            snippet: String::new(),
        }
    );

    let failing = ScriptedOcr::new(vec![Err("tesseract crashed"), Err("tesseract crashed again")]);
    let outcome = fixture.classifier(Some(&failing)).classify(0, &image_page());
    match outcome.classification {
        Classification::Unmatched { reason, .. } => {
            assert_eq!(reason, "OCR failed: tesseract crashed again");
        }
        other => panic!("expected unmatched label, got {other:?}"),
    }
    assert_eq!(outcome.trace, ExtractionTrace::ocr_failed("ocr_failed"));
}

#[test]
fn route_mode_never_runs_ocr() {
    let fixture = Fixture::new(RunMode::Route);
    let ocr = ScriptedOcr::new(vec![Ok("WZ-101-ABC")]);
    let outcome = fixture.classifier(Some(&ocr)).classify(0, &image_page());

    assert_eq!(ocr.calls.get(), 0);
    assert_eq!(outcome.classification.bucket(), Bucket::Unclassified);
}

#[test]
fn label_text_without_identifier_is_unmatched() {
    let fixture = Fixture::new(RunMode::Label);
    match fixture.classify_text("hello world") {
        Classification::Unmatched { reason, snippet } => {
            assert_eq!(reason, NO_IDENTIFIER);
            assert_eq!(snippet, "hello world");
        }
        other => panic!("expected unmatched label, got {other:?}"),
    }
}

#[test]
fn partial_score_settles_unlisted_family_members() {
    let fixture = Fixture::new(RunMode::Label);
    match fixture.classify_text("014-HG-99999-ZZ") {
        Classification::Matched {
            identifier,
            resolution,
            ..
        } => {
            assert_eq!(identifier, "014-HG-17061-A");
            assert_eq!(resolution, Resolution::Scored(70));
        }
        other => panic!("expected matched label, got {other:?}"),
    }

    assert_eq!(partial_score("048-OPAC-7", "048-OPAC-5"), 100);
    assert_eq!(partial_score("048-TL-X", "048-OPAC-5"), 50);
    assert_eq!(partial_score("060-ROT-99", "060-ROT-11L-WH"), 70);
    assert_eq!(partial_score("ABC12", "048-OPAC-5"), 0);
}

#[test]
fn empty_table_keeps_best_raw_candidate() {
    let fixture = Fixture::with_table(
        RunMode::Label,
        ReferenceTable::from_entries(Vec::new(), "empty"),
    );
    match fixture.classify_text("050-LMT-23-GY") {
        Classification::Matched {
            identifier,
            resolution,
            ..
        } => {
            assert_eq!(identifier, "050-LMT-23-GY");
            assert_eq!(resolution, Resolution::Unlisted);
        }
        other => panic!("expected matched label, got {other:?}"),
    }
}

#[test]
fn fallback_ranking_follows_configured_criteria() {
    let extractor = CandidateExtractor::new().expect("candidate regexes");
    let candidates = vec!["XY12345678901".to_string(), "048-OPAC-7".to_string()];

    assert_eq!(
        extractor.rank_fallback(&candidates, &FallbackCriterion::default_order()),
        Some(&candidates[1])
    );
    assert_eq!(
        extractor.rank_fallback(&candidates, &[FallbackCriterion::Length]),
        Some(&candidates[0])
    );
    assert_eq!(
        extractor.rank_fallback(
            &candidates,
            &[FallbackCriterion::Separator, FallbackCriterion::Length]
        ),
        Some(&candidates[1])
    );
    assert_eq!(extractor.rank_fallback(&[], &FallbackCriterion::default_order()), None);
}

#[test]
fn candidate_validator_rejects_noise_tokens() {
    let extractor = CandidateExtractor::new().expect("candidate regexes");
    assert!(extractor.is_plausible("048-OPAC-6"));
    assert!(!extractor.is_plausible("1234"));
    assert!(!extractor.is_plausible("ABCDE"));
    assert!(!extractor.is_plausible("AGD12-X"));
    assert!(!extractor.is_plausible("101-AB12"));
    assert!(!extractor.is_plausible("048-OPAC"));
    assert!(!extractor.is_plausible("AOI12X"));
}

#[test]
fn candidates_are_deduplicated_in_first_seen_order() {
    let extractor = CandidateExtractor::new().expect("candidate regexes");
    let candidates = extractor.extract("048-opac-6 and again 048-OPAC-6");

    assert_eq!(candidates.first().map(String::as_str), Some("048-OPAC-6"));
    assert_eq!(
        candidates
            .iter()
            .filter(|candidate| candidate.as_str() == "048-OPAC-6")
            .count(),
        1
    );
}

#[test]
fn label_sort_keys_follow_reference_then_pattern_then_placeholder() {
    let matcher = IdentifierMatcher::new().expect("matcher");
    let table = ReferenceTable::builtin();
    let keys = SortKeyEngine::new(&matcher, &table).expect("sort keys");

    assert_eq!(keys.label_key("048-OPAC-6H"), LabelSortKey::Reference(45));
    assert_eq!(keys.label_key("048-OPAC-9H"), LabelSortKey::Reference(45));
    assert_eq!(
        keys.label_key("ZZZ-UNKNOWN1"),
        LabelSortKey::Unlisted("ZZZ-UNKNOWN1".to_string())
    );

    let pattern = LabelSortKey::Pattern(PatternKey {
        group: 0,
        family: String::new(),
        number: 0,
        tail: String::new(),
    });
    assert!(LabelSortKey::Reference(63) < pattern);
    assert!(pattern < LabelSortKey::Unlisted(String::new()));
    assert!(LabelSortKey::Unlisted("ZZZ".to_string()) < LabelSortKey::Placeholder);
}

#[test]
fn pattern_keys_order_identifiers_without_a_table() {
    let matcher = IdentifierMatcher::new().expect("matcher");
    let table = ReferenceTable::from_entries(Vec::new(), "empty");
    let keys = SortKeyEngine::new(&matcher, &table).expect("sort keys");

    let hg = keys.label_key("014-HG-17061-A");
    let tl = keys.label_key("048-TL-W6KWD");
    let tfo = keys.label_key("TFO1S—BK");

    assert_eq!(
        hg,
        LabelSortKey::Pattern(PatternKey {
            group: 14,
            family: "HG".to_string(),
            number: 17061,
            tail: "-A".to_string(),
        })
    );
    assert_eq!(
        tfo,
        LabelSortKey::Pattern(PatternKey {
            group: 999,
            family: "TFO1S".to_string(),
            number: 0,
            tail: "BK".to_string(),
        })
    );
    assert!(hg < tl);
    assert!(tl < tfo);
}

#[test]
fn route_buckets_sort_deterministically() {
    let fixture = Fixture::new(RunMode::Route);
    let texts = [
        "XA-200-A", "WZ-300-B", "WZ-101-C", "WX-050-D", "WZ-101-E", "BB-AA-01", "AA-PP-10",
        "AA-AZ-10", "AA-AZ-09",
    ];
    let pages = texts.iter().map(|text| text_page(text)).collect::<Vec<_>>();

    let first = fixture.process(pages.clone(), &dry_run());
    let second = fixture.process(pages, &dry_run());

    let route_915 = first
        .plans
        .iter()
        .find(|plan| plan.file_name == "route_915_sorted.pdf")
        .expect("915 output planned");
    assert_eq!(route_915.pages, vec![2, 4, 1, 3, 0]);

    let route_8090 = first
        .plans
        .iter()
        .find(|plan| plan.file_name == "route_8090_sorted.pdf")
        .expect("8090 output planned");
    assert_eq!(route_8090.pages, vec![8, 7, 6, 5]);

    assert_eq!(first.plans, second.plans);
}

#[test]
fn combined_output_follows_reference_order() {
    let fixture = Fixture::new(RunMode::Label);
    let pages = vec![
        text_page("TFO1S-BK"),
        text_page("060-ROT-11L-WH"),
        text_page("014-HG-17061-A"),
    ];

    let outcome = fixture.process(pages, &dry_run());
    assert_eq!(outcome.plans[0].file_name, COMBINED_LABELS_FILE);
    assert_eq!(outcome.plans[0].pages, vec![2, 1, 0]);
}

#[test]
fn every_page_lands_in_exactly_one_output() {
    let pages = vec![
        text_page("WZ-101-ABC"),
        text_page("048-OPAC-6H"),
        image_page(),
        blank_page(),
        text_page("Total 3 Labels SO# 77"),
        text_page("hello world"),
        text_page("QQ-101-X"),
        text_page("AA-AB-12"),
    ];

    for mode in [RunMode::Route, RunMode::Label] {
        let fixture = Fixture::new(mode);
        let outcome = fixture.process(pages.clone(), &dry_run());

        let total = Bucket::ALL
            .iter()
            .map(|bucket| outcome.run.count(*bucket))
            .sum::<usize>();
        assert_eq!(total, pages.len(), "{mode:?}");

        let placed = outcome
            .plans
            .iter()
            .flat_map(|plan| plan.pages.iter().copied())
            .collect::<Vec<_>>();
        let unique = placed.iter().copied().collect::<BTreeSet<_>>();
        assert_eq!(placed.len(), pages.len(), "{mode:?}");
        assert_eq!(unique.len(), pages.len(), "{mode:?}");
    }
}

#[test]
fn split_label_buckets_adds_per_bucket_files() {
    let fixture = Fixture::new(RunMode::Label);
    let options = OutputOptions {
        split_label_buckets: true,
        ..dry_run()
    };
    let outcome = fixture.process(
        vec![text_page("048-OPAC-6"), image_page(), text_page("SO# 5 single label")],
        &options,
    );

    let names = outcome
        .plans
        .iter()
        .map(|plan| plan.file_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            COMBINED_LABELS_FILE,
            "labels_matched.pdf",
            "labels_unmatched.pdf",
            "labels_summary.pdf"
        ]
    );
}

#[test]
fn unclassified_label_pages_suggest_label_mode() {
    let fixture = Fixture::new(RunMode::Route);
    let outcome = fixture.process(
        vec![
            text_page("ALIGN 048-OPAC-6"),
            text_page("ALGIN 048-TL-W6KWD"),
            text_page("packing slip"),
        ],
        &dry_run(),
    );

    let unclassified = outcome
        .plans
        .iter()
        .find(|plan| plan.bucket == Bucket::Unclassified.as_str())
        .expect("unclassified output planned");
    assert_eq!(unclassified.file_name, UNCLASSIFIED_LABELS_FILE);
    assert_eq!(outcome.warnings.len(), 1);
}

#[test]
fn label_mode_keeps_plain_unclassified_name() {
    let fixture = Fixture::new(RunMode::Label);
    let outcome = fixture.process(vec![text_page("ALIGN QQ-101-X")], &dry_run());

    let unclassified = outcome
        .plans
        .iter()
        .find(|plan| plan.bucket == Bucket::Unclassified.as_str())
        .expect("unclassified output planned");
    assert_eq!(unclassified.file_name, "unclassified.pdf");
    assert!(
        !outcome
            .warnings
            .iter()
            .any(|warning| warning.contains("rerun in label mode"))
    );
}

#[test]
fn accumulator_rejects_duplicate_and_missing_pages() {
    let outcome = PageOutcome {
        classification: Classification::Blank,
        trace: ExtractionTrace::text_layer("", "text_layer_empty"),
    };

    let mut accumulator = BucketAccumulator::new(2);
    accumulator.record(0, outcome.clone()).expect("first record");
    assert!(accumulator.record(0, outcome.clone()).is_err());
    assert!(accumulator.record(5, outcome).is_err());
    assert!(accumulator.finish().is_err());
}

#[test]
fn page_subset_keeps_order_and_inherited_attributes() {
    let source = document_with_pages(&["P1", "P2", "P3", "P4"]);
    let dir = scratch_dir("subset");
    let path = dir.join("subset.pdf");

    write_page_subset(&source, &[2, 0], &path).expect("write subset");
    let written = Document::load(&path).expect("load subset");

    let contents = page_contents(&written);
    assert_eq!(contents.len(), 2);
    assert!(contents[0].contains("(P3)"));
    assert!(contents[1].contains("(P1)"));

    for page_id in written.get_pages().values() {
        let page = written.get_dictionary(*page_id).expect("page dictionary");
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
    }
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn page_subset_rejects_out_of_range_pages() {
    let source = document_with_pages(&["P1"]);
    let dir = scratch_dir("subset_range");
    assert!(write_page_subset(&source, &[3], &dir.join("bad.pdf")).is_err());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn visual_flag_comes_from_content_operators() {
    let document = document_with_pages(&["P1", ""]);
    let flags = document
        .get_pages()
        .values()
        .map(|page_id| page_has_marks(&document, *page_id))
        .collect::<Vec<_>>();
    assert_eq!(flags, vec![true, false]);
}

#[test]
fn render_sort_command_includes_non_default_flags() {
    let args = SortArgs {
        input: PathBuf::from("scans/algin.pdf"),
        output_dir: PathBuf::from("out"),
        mode: RunMode::Label,
        ocr_mode: OcrMode::Auto,
        ocr_lang: "eng".to_string(),
        ocr_dpi: 200,
        ocr_configs: vec!["--psm 11".to_string()],
        reference_table: Some(PathBuf::from("ALGIN.xlsx")),
        summary_detector: SummaryDetector::Strict,
        fallback_order: vec![FallbackCriterion::Length, FallbackCriterion::FamilyPrefix],
        split_label_buckets: true,
        manifest_path: Some(PathBuf::from("runs/sort.json")),
        dry_run: true,
    };

    let command = render_sort_command(&args);
    assert!(command.starts_with("labelsort sort --input scans/algin.pdf"));
    assert!(command.contains("--mode label"));
    assert!(command.contains("--ocr-dpi 200"));
    assert!(command.contains("--ocr-config \"--psm 11\""));
    assert!(command.contains("--summary-detector strict"));
    assert!(command.contains("--fallback-order length,family-prefix"));
    assert!(command.contains("--reference-table ALGIN.xlsx"));
    assert!(command.contains("--split-label-buckets"));
    assert!(command.contains("--manifest-path runs/sort.json"));
    assert!(command.ends_with("--dry-run"));

    let defaults = SortArgs {
        fallback_order: FallbackCriterion::default_order(),
        manifest_path: None,
        ..args
    };
    assert!(!render_sort_command(&defaults).contains("--fallback-order"));
}
