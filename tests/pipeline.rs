//! Integration tests for the decode → resolve → sanitize → batch pipeline.
//!
//! Rendering goes through `StubRenderer`, which writes a one-page PDF and
//! records the HTML it was handed, so no browser is needed.

use base64::Engine;
use confluence_doc2pdf::{
    convert_batch_stream, convert_batch_with, convert_file_with, convert_to_html, plan_jobs,
    prepare_html, BatchProgressCallback, ConversionConfig, ConversionError, JobOutcome,
    PdfRenderer, PrintOptions, RenderError, Stage,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// HTML containing this marker makes the stub fail.
const FAIL_MARKER: &str = "stub-render-failure";

/// A blank one-page A4 PDF.
fn one_page_pdf() -> Vec<u8> {
    use lopdf::{dictionary, Document, Object};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[derive(Default)]
struct StubRenderer {
    rendered: Mutex<Vec<String>>,
}

impl StubRenderer {
    fn last_html(&self) -> String {
        self.rendered.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl PdfRenderer for StubRenderer {
    fn name(&self) -> String {
        "stub".into()
    }

    async fn render(
        &self,
        html: &str,
        output: &Path,
        _print: &PrintOptions,
    ) -> Result<(), RenderError> {
        self.rendered.lock().unwrap().push(html.to_string());
        if html.contains(FAIL_MARKER) {
            return Err(RenderError::EngineFailed {
                engine: PathBuf::from("stub"),
                status: "exit status: 1".into(),
                stderr: "renderer refused the document".into(),
            });
        }
        tokio::fs::write(output, one_page_pdf()).await?;
        Ok(())
    }
}

const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0xf8,
    0xcf, 0xc0, 0xf0, 0x1f, 0x00, 0x05, 0x00, 0x01, 0xff, 0x89, 0x99, 0x3d, 0x1d, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// A Confluence-style export: quoted-printable HTML root plus base64 images.
fn export(body: &str, images: &[&str]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(PNG_1X1);
    let mut out = String::from(
        "Date: Mon, 1 Jan 2024 00:00:00 +0000 (UTC)\r\n\
         Message-ID: <confluence-export@localhost>\r\n\
         Subject: Exported From Confluence\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/related; \r\n\
         \tboundary=\"----=_Part_42_1.2\"\r\n\r\n",
    );
    out.push_str("------=_Part_42_1.2\r\n");
    out.push_str("Content-Type: text/html; charset=UTF-8\r\n");
    out.push_str("Content-Transfer-Encoding: quoted-printable\r\n");
    out.push_str("Content-Location: file:///C:/exported.html\r\n\r\n");
    out.push_str("<html xmlns:o=3D\"urn:schemas-microsoft-com:office:office\">\r\n");
    out.push_str("<head><title>Export</title></head><body>\r\n");
    out.push_str(body);
    out.push_str("\r\n</body></html>\r\n");
    for name in images {
        out.push_str("------=_Part_42_1.2\r\n");
        out.push_str("Content-Type: image/png\r\n");
        out.push_str("Content-Transfer-Encoding: base64\r\n");
        out.push_str(&format!("Content-Location: {name}\r\n\r\n"));
        out.push_str(&b64);
        out.push_str("\r\n");
    }
    out.push_str("------=_Part_42_1.2--\r\n");
    out
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl BatchProgressCallback for RecordingCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.events.lock().unwrap().push(format!("start {total_files}"));
    }
    fn on_file_start(&self, index: usize, total: usize, _input: &Path) {
        self.events.lock().unwrap().push(format!("file {index}/{total}"));
    }
    fn on_file_complete(&self, index: usize, _total: usize, _input: &Path, _output: &Path) {
        self.events.lock().unwrap().push(format!("ok {index}"));
    }
    fn on_file_error(&self, index: usize, _total: usize, _input: &Path, _error: &str) {
        self.events.lock().unwrap().push(format!("err {index}"));
    }
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total_files}"));
    }
}

// ── Single documents ─────────────────────────────────────────────────────────

#[test]
fn every_referenced_image_is_inlined() {
    let body = "<p>Diagrams</p>\r\n\
                <img src=3D\"exported_files/a.png\">\r\n\
                <img src=3D\"exported_files/b.png\">\r\n\
                <img src=3D\"exported_files/c.png\">";
    let raw = export(body, &["exported_files/a.png", "exported_files/b.png", "exported_files/c.png"]);

    let prepared = prepare_html(raw.as_bytes()).unwrap();
    assert_eq!(prepared.parts, 4);
    assert_eq!(prepared.report.inlined, 3);
    assert!(prepared.report.unresolved.is_empty());
    assert_eq!(prepared.html.matches("src=\"data:image/png;base64,").count(), 3);
    assert!(!prepared.html.contains("exported_files/"));
    assert_eq!(prepared.subject.as_deref(), Some("Exported From Confluence"));
}

#[test]
fn broken_reference_is_reported_not_fatal() {
    let raw = export("<img src=3D\"exported_files/missing.png\"><p>text</p>", &[]);
    let prepared = prepare_html(raw.as_bytes()).unwrap();
    assert_eq!(prepared.report.unresolved, vec!["exported_files/missing.png".to_string()]);
    assert!(prepared.html.contains("exported_files/missing.png"));
    assert!(prepared.html.contains("<p>text</p>"));
}

#[test]
fn word_markup_is_stripped() {
    let body = "<!--[if gte mso 9]><xml><w:WordDocument></w:WordDocument></xml><![endif]-->\r\n\
                <p style=3D\"mso-line-height-rule: exactly; color: red\">kept</p>\r\n\
                <o:p></o:p><div></div>";
    let raw = export(body, &[]);
    let html = prepare_html(raw.as_bytes()).unwrap().html;

    assert!(!html.contains("WordDocument"));
    assert!(!html.contains("mso-"));
    assert!(!html.contains("<o:p"));
    assert!(!html.contains("xmlns:o"));
    assert!(!html.contains("<div></div>"));
    assert!(html.contains("color: red"));
    assert!(html.contains(">kept</p>"));
}

#[test]
fn visible_text_survives_word_markup() {
    let body = "<p>Call <st1:PersonName>John Smith</st1:PersonName> today<o:p/></p>\r\n\
                <p>Second<o:p></o:p></p>";
    let raw = export(body, &[]);
    let html = prepare_html(raw.as_bytes()).unwrap().html;

    assert!(html.contains("<p>Call John Smith today</p>"), "{html}");
    assert!(html.contains("<p>Second</p>"), "{html}");
    assert!(!html.contains("st1:"));
}

#[test]
fn css_background_images_are_inlined() {
    let body = "<style>td { background: url(exported_files/a.png) }</style>\r\n\
                <table><tr><td style=3D\"background-image: url('exported_files/b.png')\">x</td></tr></table>";
    let raw = export(body, &["exported_files/a.png", "exported_files/b.png"]);
    let prepared = prepare_html(raw.as_bytes()).unwrap();

    assert_eq!(prepared.report.inlined, 2);
    assert!(prepared.report.unresolved.is_empty());
    assert!(!prepared.html.contains("exported_files/"), "{}", prepared.html);
}

#[test]
fn sanitizing_twice_changes_nothing() {
    let body = "<![if !supportLists]>1.<![endif]><p style=3D\"mso-bidi-font-size:11pt\">x</p>\
                <div><div></div></div><v:shape id=3D\"s\"></v:shape>";
    let once = prepare_html(export(body, &[]).as_bytes()).unwrap().html;
    let twice = confluence_doc2pdf::pipeline::sanitize::sanitize(&once);
    assert_eq!(once, twice);
}

#[test]
fn non_mime_input_is_a_decode_error() {
    let err = prepare_html(b"just some text, not an export").unwrap_err();
    assert!(err.to_string().contains("Content-Type"), "got: {err}");
}

#[tokio::test]
async fn single_file_renders_through_renderer() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Page.doc");
    write(&input, &export("<img src=3D\"exported_files/a.png\">", &["exported_files/a.png"]));
    let output = dir.path().join("out/Page.pdf");

    let renderer = StubRenderer::default();
    let stats = convert_file_with(
        &renderer,
        input.to_str().unwrap(),
        &output,
        &ConversionConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(stats.inlined_resources, 1);
    assert_eq!(stats.output, output);
    assert_eq!(stats.output_bytes, one_page_pdf().len() as u64);
    assert!(renderer.last_html().contains("data:image/png;base64,"));
    assert_eq!(std::fs::read(&output).unwrap(), one_page_pdf());
}

#[tokio::test]
async fn render_failure_names_the_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Broken.doc");
    write(&input, &export(FAIL_MARKER, &[]));

    let err = convert_file_with(
        &StubRenderer::default(),
        input.to_str().unwrap(),
        dir.path().join("Broken.pdf"),
        &ConversionConfig::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.stage(), Stage::Render);
    assert!(err.to_string().contains("Broken.doc"), "got: {err}");
    assert!(!dir.path().join("Broken.pdf").exists());
}

#[tokio::test]
async fn wrong_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Page.html");
    write(&input, &export("<p>x</p>", &[]));

    let err = convert_file_with(
        &StubRenderer::default(),
        input.to_str().unwrap(),
        dir.path().join("Page.pdf"),
        &ConversionConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConversionError::UnsupportedExtension { .. }));
}

#[tokio::test]
async fn html_only_output_is_self_contained() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Page.mht");
    write(&input, &export("<img src=3D\"exported_files/a.png\">", &["exported_files/a.png"]));
    let output = dir.path().join("Page.html");

    let stats = convert_to_html(input.to_str().unwrap(), &output, &ConversionConfig::default())
        .await
        .unwrap();
    let html = std::fs::read_to_string(&output).unwrap();
    assert_eq!(stats.html_bytes, html.len());
    assert!(html.contains("data:image/png;base64,"));
    assert!(!dir.path().join("Page.html.tmp").exists());
}

// ── Batches ──────────────────────────────────────────────────────────────────

/// Five exports, two of them broken in different stages.
fn populate(input: &Path) {
    write(&input.join("a.doc"), &export("<p>a</p>", &[]));
    write(&input.join("b.doc"), "not an export at all");
    write(&input.join("c.mht"), &export("<p>c</p>", &[]));
    write(&input.join("nested/d.mhtml"), &export(FAIL_MARKER, &[]));
    write(&input.join("nested/e.doc"), &export("<p>e</p>", &[]));
    write(&input.join("readme.txt"), "ignored");
}

#[tokio::test]
async fn batch_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let (input, output) = (dir.path().join("in"), dir.path().join("out"));
    populate(&input);

    let report = convert_batch_with(
        Arc::new(StubRenderer::default()),
        &input,
        &output,
        &ConversionConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.converted(), 3);
    assert_eq!(report.failed(), 2);
    assert!(!report.is_success());

    let failures: Vec<(PathBuf, Stage)> = report
        .failures()
        .map(|(path, failure)| (path.strip_prefix(&input).unwrap().to_path_buf(), failure.stage))
        .collect();
    assert_eq!(
        failures,
        vec![
            (PathBuf::from("b.doc"), Stage::Decode),
            (PathBuf::from("nested/d.mhtml"), Stage::Render),
        ]
    );

    assert!(output.join("a.pdf").exists());
    assert!(output.join("c.pdf").exists());
    assert!(output.join("nested/e.pdf").exists());
    assert!(!output.join("b.pdf").exists());
    assert!(!output.join("nested/d.pdf").exists());
}

#[tokio::test]
async fn skip_existing_keeps_valid_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let (input, output) = (dir.path().join("in"), dir.path().join("out"));
    write(&input.join("a.doc"), &export("<p>a</p>", &[]));
    write(&input.join("b.doc"), &export("<p>b</p>", &[]));
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join("a.pdf"), one_page_pdf()).unwrap();
    // Truncated from an interrupted run: must be redone.
    std::fs::write(output.join("b.pdf"), b"%PDF-1.4\n1 0 obj").unwrap();

    let renderer = Arc::new(StubRenderer::default());
    let config = ConversionConfig::builder().skip_existing(true).build().unwrap();
    let report = convert_batch_with(renderer.clone(), &input, &output, &config)
        .await
        .unwrap();

    assert!(matches!(report.outcomes[0], JobOutcome::Skipped { .. }));
    assert!(matches!(report.outcomes[1], JobOutcome::Converted { .. }));
    assert_eq!(renderer.rendered.lock().unwrap().len(), 1);
    assert_eq!(std::fs::read(output.join("b.pdf")).unwrap(), one_page_pdf());
}

#[tokio::test]
async fn progress_events_follow_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let (input, output) = (dir.path().join("in"), dir.path().join("out"));
    write(&input.join("a.doc"), &export("<p>a</p>", &[]));
    write(&input.join("b.doc"), "broken");

    let recorder = Arc::new(RecordingCallback::default());
    let config = ConversionConfig::builder()
        .progress_callback(recorder.clone() as Arc<dyn BatchProgressCallback>)
        .build()
        .unwrap();
    convert_batch_with(Arc::new(StubRenderer::default()), &input, &output, &config)
        .await
        .unwrap();

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["start 2", "file 1/2", "ok 1", "file 2/2", "err 2", "done 1/2"]
    );
}

#[tokio::test]
async fn streamed_outcomes_match_plan_order() {
    let dir = tempfile::tempdir().unwrap();
    let (input, output) = (dir.path().join("in"), dir.path().join("out"));
    populate(&input);

    let config = ConversionConfig::default();
    let planned: Vec<PathBuf> = plan_jobs(&input, &output, &config)
        .unwrap()
        .into_iter()
        .map(|job| job.input)
        .collect();
    let jobs = plan_jobs(&input, &output, &config).unwrap();
    let streamed: Vec<PathBuf> =
        confluence_doc2pdf::convert_jobs(Arc::new(StubRenderer::default()), jobs, &config)
            .map(|outcome| outcome.input().to_path_buf())
            .collect()
            .await;
    assert_eq!(streamed, planned);
}

#[test]
fn empty_batch_stream_needs_no_browser() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .chrome_path(dir.path().join("no-browser-here"))
        .build()
        .unwrap();

    let outcomes: Vec<JobOutcome> = tokio_test::block_on(async {
        let stream = tokio_test::assert_ok!(convert_batch_stream(
            dir.path(),
            dir.path().join("out"),
            &config
        ));
        stream.collect().await
    });
    assert!(outcomes.is_empty());
}
