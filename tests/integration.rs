//! End-to-end tests of the processing and query pipeline through the
//! library API.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use futures::{pin_mut, StreamExt};

use large_file_intel::config::Config;
use large_file_intel_core::cancel::CancelSignal;
use large_file_intel_core::embedding::{SimilarityMetric, TermFrequencyEmbedder};
use large_file_intel_core::models::Chunk;
use large_file_intel_core::store::memory::InMemoryVectorStore;
use large_file_intel_core::store::{ChunkCandidate, VectorEntry, VectorStore};
use large_file_intel::intel::ProcessingStatus;
use large_file_intel::progress::{ProgressEvent, ProgressReporter, Stage};
use large_file_intel::{FailureKind, InputFile, LargeFileIntelligence, ProcessOptions};

const ML_DOC: &str = "# Machine Learning\n\n\
Machine learning algorithms learn patterns from data. Popular machine learning \
algorithms include decision trees, support vector machines and neural networks.\n\n\
Training an algorithm means fitting its parameters to examples.";

const COOKING_DOC: &str = "# Pasta\n\n\
Fresh pasta needs flour, eggs and a little salt. Knead the dough until smooth, \
rest it for thirty minutes, then roll it thin and cut ribbons.";

fn intel_with(config: Config) -> LargeFileIntelligence {
    LargeFileIntelligence::new(config).unwrap()
}

fn small_chunks() -> Config {
    let mut config = Config::default();
    config.chunking.max_chunk_size = 100;
    config.chunking.overlap_size = 10;
    config
}

async fn ingest(intel: &LargeFileIntelligence, name: &str, text: &str) -> String {
    intel
        .process_file(InputFile::new(name, text), ProcessOptions::default())
        .await
        .unwrap()
        .document_id
}

#[tokio::test]
async fn small_document_is_a_single_chunk() {
    let intel = intel_with(Config::default());
    let text: Vec<String> = (0..231).map(|i| format!("word{}", i)).collect();
    let text = text.join(" ");

    let result = intel
        .process_file(InputFile::new("short.txt", text.clone()), ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, ProcessingStatus::Indexed);
    assert_eq!(result.file_name, "short.txt");
    assert_eq!(result.mime_type, "text/plain");
    assert_eq!(result.chunking_result.total_chunks, 1);
    assert_eq!(result.chunking_result.total_words, 231);
    assert_eq!(result.chunking_result.total_chars, text.chars().count());
    assert!(!result.chunking_result.truncated);
    assert_eq!(result.indexed_entries, 1);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["chunkingResult"]["totalChunks"], 1);
    assert_eq!(json["documentId"], result.document_id.as_str());
}

#[tokio::test]
async fn query_respects_threshold_and_documents() {
    let intel = intel_with(Config::default());
    let ml = ingest(&intel, "ml.md", ML_DOC).await;
    let cooking = ingest(&intel, "pasta.md", COOKING_DOC).await;

    let mut opts = intel.default_query_options();
    opts.similarity_threshold = 0.3;
    let result = intel
        .query("machine learning algorithms", &[ml.clone(), cooking], &opts)
        .await
        .unwrap();

    let ctx = &result.context;
    assert_eq!(result.query, "machine learning algorithms");
    assert!(!ctx.is_empty());
    assert_eq!(ctx.total_chunks, ctx.chunks.len());
    assert!(ctx.chunks.iter().all(|c| c.score >= 0.3));
    assert!(ctx.chunks.iter().all(|c| c.document_id == ml));
    assert!(ctx.chunks.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(ctx.text.contains("Machine learning algorithms"));
    assert!(ctx.text.chars().count() <= opts.max_context_size);
}

#[tokio::test]
async fn query_document_filter_limits_search() {
    let intel = intel_with(Config::default());
    let _ml = ingest(&intel, "ml.md", ML_DOC).await;
    let cooking = ingest(&intel, "pasta.md", COOKING_DOC).await;

    let mut opts = intel.default_query_options();
    opts.similarity_threshold = 0.3;
    let result = intel
        .query("machine learning algorithms", &[cooking], &opts)
        .await
        .unwrap();
    assert!(result.context.is_empty());
    assert_eq!(result.context.text, "");

    let unknown = intel
        .query("machine learning", &["no-such-document".to_string()], &opts)
        .await
        .unwrap();
    assert!(unknown.context.is_empty());

    let everything = intel.query("machine learning", &[], &opts).await.unwrap();
    assert!(!everything.context.is_empty());
}

#[tokio::test]
async fn empty_file_is_not_an_error() {
    let intel = intel_with(Config::default());
    for body in ["", "   \n\t  "] {
        let result = intel
            .process_file(InputFile::new("empty.txt", body), ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(result.status, ProcessingStatus::EmptyContent);
        assert_eq!(result.chunking_result.total_chunks, 0);
        assert_eq!(result.indexed_entries, 0);
    }
    assert_eq!(intel.stats().await.unwrap().indexed_entries, 0);
}

#[tokio::test]
async fn cancel_during_chunking_leaves_no_entries() {
    let intel = intel_with(small_chunks());
    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    let reporter: Arc<dyn ProgressReporter> = Arc::new(move |e: &ProgressEvent| {
        if e.stage == Stage::Chunking && e.progress >= 0.5 {
            trigger.cancel();
        }
    });

    let text = "Streams of words keep flowing through the chunker. ".repeat(400);
    let err = intel
        .process_file(
            InputFile::new("long.txt", text),
            ProcessOptions::default()
                .with_reporter(reporter)
                .with_cancel(cancel),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Cancelled);
    assert_eq!(err.file_name(), "long.txt");
    assert_eq!(intel.stats().await.unwrap().indexed_entries, 0);
    assert!(intel.documents().await.is_empty());
}

#[tokio::test]
async fn cancel_during_indexing_leaves_no_entries() {
    let mut config = small_chunks();
    config.processing.batch_size = 2;
    let intel = intel_with(config);
    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    let reporter: Arc<dyn ProgressReporter> = Arc::new(move |e: &ProgressEvent| {
        if e.stage == Stage::Indexing && e.progress >= 0.5 {
            trigger.cancel();
        }
    });

    let text = "Embedding batches are written in one commit at the end. ".repeat(60);
    let err = intel
        .process_file(
            InputFile::new("batched.txt", text),
            ProcessOptions::default()
                .with_reporter(reporter)
                .with_cancel(cancel.clone()),
        )
        .await
        .unwrap_err();

    assert!(cancel.is_cancelled());
    assert_eq!(err.kind(), FailureKind::Cancelled);
    assert_eq!(err.file_name(), "batched.txt");
    assert_eq!(intel.stats().await.unwrap().indexed_entries, 0);
    assert!(intel.documents().await.is_empty());
}

#[tokio::test]
async fn readers_never_see_a_partially_indexed_document() {
    let mut config = small_chunks();
    config.processing.batch_size = 1;
    let intel = intel_with(config);
    let finished = AtomicBool::new(false);
    let text = "Readers never observe partial documents here. ".repeat(300);

    let writer = async {
        let result = intel
            .process_file(InputFile::new("many.txt", text), ProcessOptions::default())
            .await
            .unwrap();
        finished.store(true, Ordering::SeqCst);
        result
    };
    let reader = async {
        let opts = intel.default_query_options();
        let mut counts = HashSet::new();
        while !finished.load(Ordering::SeqCst) {
            counts.insert(intel.stats().await.unwrap().indexed_entries);
            intel.query("partial documents", &[], &opts).await.unwrap();
            tokio::task::yield_now().await;
        }
        counts.insert(intel.stats().await.unwrap().indexed_entries);
        counts
    };
    let (result, counts) = tokio::join!(writer, reader);

    let total = result.indexed_entries;
    assert!(total >= 100, "only {} chunks", total);
    assert!(counts.contains(&total));
    assert!(
        counts.iter().all(|&n| n == 0 || n == total),
        "observed {:?} with total {}",
        counts,
        total
    );
}

#[tokio::test]
async fn cancel_before_start_is_reported() {
    let intel = intel_with(Config::default());
    let cancel = CancelSignal::new();
    cancel.cancel();
    let err = intel
        .process_file(
            InputFile::new("a.txt", "some text"),
            ProcessOptions::default().with_cancel(cancel),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Cancelled);
}

#[tokio::test]
async fn reprocessing_is_idempotent() {
    let intel = intel_with(small_chunks());
    let text = format!("{}\n\n{}", ML_DOC, COOKING_DOC);

    let first = intel
        .process_file(InputFile::new("mixed.md", text.clone()), ProcessOptions::default())
        .await
        .unwrap();
    let entries = intel.stats().await.unwrap().indexed_entries;
    let opts = intel.default_query_options();
    let before = intel.query("pasta dough", &[], &opts).await.unwrap();

    let second = intel
        .process_file(InputFile::new("mixed.md", text), ProcessOptions::default())
        .await
        .unwrap();
    let after = intel.query("pasta dough", &[], &opts).await.unwrap();

    assert_eq!(first.document_id, second.document_id);
    assert_eq!(intel.stats().await.unwrap().indexed_entries, entries);
    assert_eq!(intel.documents().await.len(), 1);
    assert_eq!(before.context.text, after.context.text);
    let ids = |c: &large_file_intel_core::assemble::Context| {
        c.chunks.iter().map(|x| x.chunk_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&before.context), ids(&after.context));
}

#[tokio::test]
async fn unsupported_and_undecodable_files_fail() {
    let intel = intel_with(Config::default());

    let err = intel
        .process_file(InputFile::new("photo.png", vec![0x89, b'P', b'N', b'G']), ProcessOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::UnsupportedFormat);

    let err = intel
        .process_file(InputFile::new("bad.txt", vec![0xff, 0xfe, 0xfd]), ProcessOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::UnsupportedFormat);

    let err = intel
        .process_file(
            InputFile::new("fake.pdf", b"not a pdf".to_vec()),
            ProcessOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::UnsupportedFormat);
}

#[tokio::test]
async fn declared_mime_type_overrides_extension() {
    let intel = intel_with(Config::default());
    let result = intel
        .process_file(
            InputFile::new("upload.bin", "plain words inside").with_mime_type("text/plain"),
            ProcessOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.mime_type, "text/plain");
    assert_eq!(result.status, ProcessingStatus::Indexed);
}

#[tokio::test]
async fn oversized_file_is_rejected() {
    let mut config = Config::default();
    config.processing.max_file_size = 16;
    let intel = intel_with(config);

    let err = intel
        .process_file(InputFile::new("big.txt", "x".repeat(17)), ProcessOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::SizeExceeded);
    assert!(err.to_string().contains("17 bytes"));

    intel
        .process_file(InputFile::new("ok.txt", "x".repeat(16)), ProcessOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn truncation_is_reported() {
    let mut config = small_chunks();
    config.chunking.max_chunks_per_document = 3;
    let intel = intel_with(config);

    let result = intel
        .process_file(
            InputFile::new("long.txt", "Many sentences fill this file. ".repeat(50)),
            ProcessOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.chunking_result.total_chunks, 3);
    assert!(result.chunking_result.truncated);
    assert!(result.chunking_result.truncated_at.is_some());
    assert_eq!(result.indexed_entries, 3);
}

#[tokio::test]
async fn concurrency_is_bounded_and_fifo_queued() {
    let mut config = Config::default();
    config.processing.max_concurrent_files = 1;
    let intel = intel_with(config);

    #[derive(Default)]
    struct Tracker {
        active: HashSet<String>,
        max_active: usize,
        order: Vec<(String, Stage)>,
    }
    let tracker = Arc::new(Mutex::new(Tracker::default()));
    let sink = tracker.clone();
    let reporter: Arc<dyn ProgressReporter> = Arc::new(move |e: &ProgressEvent| {
        let mut t = sink.lock().unwrap();
        match e.stage {
            Stage::Chunking => {
                t.active.insert(e.file_name.clone());
            }
            Stage::Done => {
                t.active.remove(&e.file_name);
            }
            _ => {}
        }
        t.max_active = t.max_active.max(t.active.len());
        if matches!(e.stage, Stage::Queued | Stage::Done) {
            t.order.push((e.file_name.clone(), e.stage));
        }
    });

    let files: Vec<InputFile> = (0..4)
        .map(|i| InputFile::new(format!("f{}.txt", i), format!("document number {} body", i)))
        .collect();
    let results = intel
        .process_files(files, ProcessOptions::default().with_reporter(reporter))
        .await;

    assert_eq!(results.len(), 4);
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.as_ref().unwrap().file_name, format!("f{}.txt", i));
    }

    let t = tracker.lock().unwrap();
    assert_eq!(t.max_active, 1);
    let queued: Vec<&str> = t
        .order
        .iter()
        .filter(|(_, s)| *s == Stage::Queued)
        .map(|(f, _)| f.as_str())
        .collect();
    let done: Vec<&str> = t
        .order
        .iter()
        .filter(|(_, s)| *s == Stage::Done)
        .map(|(f, _)| f.as_str())
        .collect();
    assert_eq!(queued.len(), 4);
    assert_eq!(queued, done);
    assert_eq!(intel.stats().await.unwrap().available_slots, 1);
}

#[tokio::test]
async fn stream_yields_best_first() {
    let intel = intel_with(small_chunks());
    ingest(&intel, "ml.md", ML_DOC).await;
    ingest(&intel, "pasta.md", COOKING_DOC).await;

    let mut opts = intel.default_query_options();
    opts.max_chunks = 10;
    opts.similarity_threshold = 0.0;
    let stream = intel
        .stream_query("machine learning algorithms", &[], &opts)
        .unwrap();
    pin_mut!(stream);

    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item.unwrap());
    }
    assert!(!items.is_empty());
    assert!(items.len() <= 10);
    assert!(items.windows(2).all(|w| w[0].score >= w[1].score));
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item.rank, i);
        assert_eq!(item.total, items.len());
        assert_eq!(item.query, "machine learning algorithms");
    }
}

#[tokio::test]
async fn stream_can_be_disabled() {
    let mut config = Config::default();
    config.processing.enable_streaming = false;
    let intel = intel_with(config);
    let opts = intel.default_query_options();
    assert!(intel.stream_query("anything", &[], &opts).is_err());
}

#[tokio::test]
async fn neighbors_stitch_adjacent_chunks() {
    let intel = intel_with(small_chunks());
    let text = "Alpha section talks about glaciers and ice sheets in detail.\n\n\
Beta section covers volcanic eruptions and magma chambers underground.\n\n\
Gamma section explains ocean currents and thermohaline circulation.";
    let doc = ingest(&intel, "geo.txt", text).await;

    let mut opts = intel.default_query_options();
    opts.max_chunks = 1;
    opts.include_neighbors = true;
    let result = intel
        .query("volcanic eruptions magma", &[doc], &opts)
        .await
        .unwrap();

    let ctx = result.context;
    assert!(ctx.chunks.len() >= 2);
    assert_eq!(ctx.chunks.iter().filter(|c| !c.neighbor).count(), 1);
    let indices: Vec<usize> = ctx.chunks.iter().map(|c| c.chunk_index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(indices, sorted);
    assert!(ctx.text.contains("volcanic eruptions"));
}

#[tokio::test]
async fn remove_document_drops_entries() {
    let intel = intel_with(Config::default());
    let id = ingest(&intel, "ml.md", ML_DOC).await;
    assert!(intel.document(&id).await.is_some());

    assert!(intel.remove_document(&id).await.unwrap());
    assert!(!intel.remove_document(&id).await.unwrap());
    assert!(intel.document(&id).await.is_none());

    let opts = intel.default_query_options();
    let result = intel.query("machine learning", &[], &opts).await.unwrap();
    assert!(result.context.is_empty());
    assert_eq!(intel.stats().await.unwrap().indexed_entries, 0);
}

/// A store that refuses writes, to check that failures surface as internal
/// errors and nothing gets registered.
struct ReadOnlyStore(InMemoryVectorStore);

#[async_trait]
impl VectorStore for ReadOnlyStore {
    fn metric(&self) -> SimilarityMetric {
        self.0.metric()
    }
    async fn index(&self, _entry: VectorEntry) -> Result<()> {
        anyhow::bail!("read-only store")
    }
    async fn replace_document(&self, _document_id: &str, _entries: Vec<VectorEntry>) -> Result<()> {
        anyhow::bail!("read-only store")
    }
    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<ChunkCandidate>> {
        self.0.search(query_vec, k, document_ids).await
    }
    async fn get_chunk(&self, document_id: &str, chunk_index: usize) -> Result<Option<Chunk>> {
        self.0.get_chunk(document_id, chunk_index).await
    }
    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        self.0.delete_document(document_id).await
    }
    async fn document_entry_count(&self, document_id: &str) -> Result<usize> {
        self.0.document_entry_count(document_id).await
    }
    async fn entry_count(&self) -> Result<usize> {
        self.0.entry_count().await
    }
}

#[tokio::test]
async fn store_failure_is_internal_error() {
    let config = Config::default();
    let intel = LargeFileIntelligence::with_backend(
        config,
        Arc::new(ReadOnlyStore(InMemoryVectorStore::default())),
        Arc::new(TermFrequencyEmbedder::new(100)),
    )
    .unwrap();

    let err = intel
        .process_file(InputFile::new("ml.md", ML_DOC), ProcessOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Internal);
    assert!(err.to_string().contains("read-only store"));
    assert!(intel.documents().await.is_empty());
}

#[tokio::test]
async fn euclidean_metric_ranks_related_text_first() {
    let mut config = Config::default();
    config.retrieval.similarity_metric = SimilarityMetric::Euclidean;
    let intel = intel_with(config);
    let ml = ingest(&intel, "ml.md", ML_DOC).await;
    ingest(&intel, "pasta.md", COOKING_DOC).await;

    let mut opts = intel.default_query_options();
    opts.similarity_threshold = 0.0;
    let result = intel
        .query("machine learning algorithms", &[], &opts)
        .await
        .unwrap();
    assert_eq!(result.context.chunks[0].document_id, ml);
    assert!(result.context.chunks.iter().all(|c| c.score > 0.0 && c.score <= 1.0));
}

fn docx_with_text(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[tokio::test]
async fn docx_upload_is_indexed_and_searchable() {
    let intel = intel_with(Config::default());
    let bytes = docx_with_text(&["Quarterly revenue grew in every region.", "Churn fell slightly."]);
    let result = intel
        .process_file(InputFile::new("report.docx", bytes), ProcessOptions::default())
        .await
        .unwrap();
    assert_eq!(result.status, ProcessingStatus::Indexed);
    assert_eq!(result.chunking_result.total_words, 9);

    let opts = intel.default_query_options();
    let found = intel
        .query("quarterly revenue", &[result.document_id], &opts)
        .await
        .unwrap();
    assert!(found.context.text.contains("Quarterly revenue grew"));
}
