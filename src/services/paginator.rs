//! Splits a PDF into consecutive chunks of a bounded number of pages.
//!
//! Chunks land in `{base}_chunks/chunk_{n}.pdf` next to the source, where `base` is the
//! source path without its extension and `n` counts from 1. A run either writes every
//! chunk or leaves nothing behind: chunks are staged in a hidden sibling directory that
//! is renamed into place only after the last chunk is written.

use std::collections::HashSet;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use thiserror::Error;
use uuid::Uuid;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_PAGE_TREE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum PaginatorError {
    #[error("max pages per chunk must be at least 1")]
    InvalidPageLimit,
    #[error("failed to read document {path}: {message}")]
    DocumentRead { path: PathBuf, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize chunk {index}: {message}")]
    Serialize { index: usize, message: String },
}

/// One output chunk: its 1-based number and the 0-based source pages it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub index: usize,
    pub pages: Range<u32>,
}

pub fn plan_chunks(total_pages: u32, max_pages_per_chunk: usize) -> Vec<ChunkPlan> {
    if max_pages_per_chunk == 0 {
        return Vec::new();
    }

    let step = u32::try_from(max_pages_per_chunk).unwrap_or(u32::MAX);
    let mut plans = Vec::new();
    let mut start = 0u32;
    while start < total_pages {
        let end = start.saturating_add(step).min(total_pages);
        plans.push(ChunkPlan { index: plans.len() + 1, pages: start..end });
        start = end;
    }
    plans
}

pub fn chunk_dir_for(source: &Path) -> PathBuf {
    let base = source.file_stem().map(|stem| stem.to_string_lossy()).unwrap_or_default();
    let parent = source.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{base}_chunks"))
}

pub fn chunk_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("chunk_{index}.pdf"))
}

/// Writes every chunk of `source_path` and returns how many were written.
///
/// A source with no pages yields 0 and creates no directory. This is blocking work;
/// async callers should run it on the blocking pool.
pub fn paginate(source_path: &Path, max_pages_per_chunk: usize) -> Result<usize, PaginatorError> {
    if max_pages_per_chunk == 0 {
        return Err(PaginatorError::InvalidPageLimit);
    }

    let document = Document::load(source_path).map_err(|err| PaginatorError::DocumentRead {
        path: source_path.to_path_buf(),
        message: err.to_string(),
    })?;

    let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
    let total_pages = u32::try_from(page_ids.len()).unwrap_or(u32::MAX);
    let plans = plan_chunks(total_pages, max_pages_per_chunk);
    if plans.is_empty() {
        tracing::info!(source = %source_path.display(), "Document has no pages");
        return Ok(0);
    }

    let destination = chunk_dir_for(source_path);
    let staging = staging_dir_for(&destination);
    fs::create_dir(&staging)?;

    let written = write_chunks(&document, &page_ids, &plans, &staging)
        .and_then(|()| fs::rename(&staging, &destination).map_err(PaginatorError::from));

    if let Err(err) = written {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            tracing::warn!(
                staging = %staging.display(),
                error = %cleanup,
                "Failed to remove chunk staging directory"
            );
        }
        return Err(err);
    }

    metrics::counter!("paginator_chunks_written_total").increment(plans.len() as u64);
    tracing::info!(
        source = %source_path.display(),
        chunk_dir = %destination.display(),
        total_pages,
        chunks = plans.len(),
        "Document paginated"
    );

    Ok(plans.len())
}

fn write_chunks(
    document: &Document,
    page_ids: &[ObjectId],
    plans: &[ChunkPlan],
    dir: &Path,
) -> Result<(), PaginatorError> {
    for plan in plans {
        let keep = &page_ids[plan.pages.start as usize..plan.pages.end as usize];
        let mut chunk = build_chunk(document, page_ids, keep);
        chunk.renumber_objects();
        chunk.compress();

        let mut bytes = Vec::new();
        chunk.save_to(&mut bytes).map_err(|err| PaginatorError::Serialize {
            index: plan.index,
            message: err.to_string(),
        })?;
        fs::write(chunk_path(dir, plan.index), bytes)?;
    }

    Ok(())
}

/// Builds a fresh document holding `keep` in order, plus only the objects they reach.
///
/// Other pages of the source are never copied, even when an annotation points at them.
fn build_chunk(source: &Document, all_pages: &[ObjectId], keep: &[ObjectId]) -> Document {
    let mut chunk = Document::with_version(source.version.clone());
    chunk.max_id = source.max_id;
    let pages_id = chunk.new_object_id();

    let mut visited: HashSet<ObjectId> = all_pages.iter().copied().collect();
    let mut pending = Vec::new();
    let mut kids = Vec::with_capacity(keep.len());

    for &page_id in keep {
        let mut page = source.get_dictionary(page_id).cloned().unwrap_or_default();
        for key in INHERITABLE_PAGE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(source, &page, key) {
                    page.set(key, value);
                }
            }
        }
        page.set("Parent", pages_id);

        push_dictionary_references(&page, &mut pending);
        chunk.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    while let Some(id) = pending.pop() {
        if id == pages_id || !visited.insert(id) {
            continue;
        }
        let Ok(object) = source.get_object(id) else {
            continue;
        };
        push_references(object, &mut pending);
        chunk.objects.insert(id, object.clone());
    }

    let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
    chunk.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = chunk.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    chunk.trailer.set("Root", catalog_id);
    chunk
}

fn inherited_attribute(source: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let node = source.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn push_references(object: &Object, pending: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => pending.push(*id),
        Object::Array(items) => items.iter().for_each(|item| push_references(item, pending)),
        Object::Dictionary(dict) => push_dictionary_references(dict, pending),
        Object::Stream(stream) => push_dictionary_references(&stream.dict, pending),
        _ => {}
    }
}

fn push_dictionary_references(dict: &Dictionary, pending: &mut Vec<ObjectId>) {
    for (_, value) in dict.iter() {
        push_references(value, pending);
    }
}

fn staging_dir_for(destination: &Path) -> PathBuf {
    let name = destination.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    destination.with_file_name(format!(".{name}.staging-{}", Uuid::new_v4().simple()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::Stream;
    use std::time::{Duration, Instant};

    /// Writes a PDF whose page dictionaries carry a `Marker` equal to their 0-based position.
    pub(crate) fn write_marked_pdf(path: &Path, pages: u32) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..pages)
            .map(|marker| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                    "Marker" => i64::from(marker),
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => i64::from(pages),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).expect("write fixture pdf");
    }

    pub(crate) fn page_markers(path: &Path) -> Vec<i64> {
        let doc = Document::load(path).expect("load chunk");
        doc.get_pages()
            .values()
            .map(|id| {
                doc.get_dictionary(*id)
                    .and_then(|page| page.get(b"Marker"))
                    .and_then(Object::as_i64)
                    .expect("page marker")
            })
            .collect()
    }

    #[test]
    fn plans_cover_every_page_once() {
        let plans = plan_chunks(7, 3);
        let ranges: Vec<Range<u32>> = plans.iter().map(|plan| plan.pages.clone()).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..7]);
        assert_eq!(plans.iter().map(|plan| plan.index).collect::<Vec<_>>(), vec![1, 2, 3]);

        assert_eq!(plan_chunks(6, 3).len(), 2);
        assert_eq!(plan_chunks(2, 10), vec![ChunkPlan { index: 1, pages: 0..2 }]);
        assert!(plan_chunks(0, 4).is_empty());
        assert!(plan_chunks(5, 0).is_empty());
    }

    #[test]
    fn chunk_paths_sit_next_to_source() {
        let dir = chunk_dir_for(Path::new("/data/uploads/exam.final.pdf"));
        assert_eq!(dir, PathBuf::from("/data/uploads/exam.final_chunks"));
        assert_eq!(
            chunk_path(&dir, 2),
            PathBuf::from("/data/uploads/exam.final_chunks/chunk_2.pdf")
        );
    }

    #[test]
    fn splits_pages_in_order() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("exam.pdf");
        write_marked_pdf(&source, 7);

        let count = paginate(&source, 3).expect("paginate");
        assert_eq!(count, 3);

        let dir = tmp.path().join("exam_chunks");
        assert_eq!(page_markers(&chunk_path(&dir, 1)), vec![0, 1, 2]);
        assert_eq!(page_markers(&chunk_path(&dir, 2)), vec![3, 4, 5]);
        assert_eq!(page_markers(&chunk_path(&dir, 3)), vec![6]);
        assert!(!chunk_path(&dir, 4).exists());
    }

    #[test]
    fn chunks_carry_only_their_own_pages() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("reader.pdf");

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..300)
            .map(|marker: i64| {
                let body = format!("BT /F1 12 Tf (page {marker}) Tj ET").repeat(40);
                let contents = doc.add_object(Stream::new(Dictionary::new(), body.into_bytes()));
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                    "Contents" => contents,
                    "Marker" => marker,
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 300_i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc.save(&source).expect("write source");

        let started = Instant::now();
        assert_eq!(paginate(&source, 1).expect("paginate"), 300);
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_secs(15), "paginating 300 pages took {elapsed:?}");

        let dir = tmp.path().join("reader_chunks");
        for index in [1, 150, 300] {
            let path = chunk_path(&dir, index);
            assert_eq!(page_markers(&path), vec![index as i64 - 1]);
            // page, its contents, the page tree root and the catalog
            let chunk = Document::load(&path).expect("load chunk");
            assert!(chunk.objects.len() <= 4, "chunk {index}: {} objects", chunk.objects.len());
        }
    }

    #[test]
    fn pages_keep_attributes_inherited_from_page_tree() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("inherit.pdf");

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..3)
            .map(|marker: i64| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "Marker" => marker,
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 3_i64,
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
                "Resources" => dictionary! { "ProcSet" => vec![Object::Name(b"PDF".to_vec())] },
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc.save(&source).expect("write source");

        assert_eq!(paginate(&source, 2).expect("paginate"), 2);

        let second = chunk_path(&tmp.path().join("inherit_chunks"), 2);
        let chunk = Document::load(second).expect("load chunk");
        let page_id = *chunk.get_pages().values().next().expect("one page");
        let page = chunk.get_dictionary(page_id).expect("page");
        let media_box = page.get(b"MediaBox").and_then(Object::as_array).expect("media box");
        assert_eq!(media_box.len(), 4);
        assert_eq!(media_box[3].as_i64().expect("height"), 400);
        assert!(page.has(b"Resources"));
        assert_eq!(page.get(b"Marker").and_then(Object::as_i64).expect("marker"), 2);
    }

    #[test]
    fn large_limit_gives_single_chunk() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("short.pdf");
        write_marked_pdf(&source, 2);

        assert_eq!(paginate(&source, 50).expect("paginate"), 1);
        let dir = tmp.path().join("short_chunks");
        assert_eq!(page_markers(&chunk_path(&dir, 1)), vec![0, 1]);
    }

    #[test]
    fn empty_document_creates_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("blank.pdf");
        write_marked_pdf(&source, 0);

        assert_eq!(paginate(&source, 2).expect("paginate"), 0);
        assert!(!tmp.path().join("blank_chunks").exists());
    }

    #[test]
    fn zero_page_limit_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("exam.pdf");
        write_marked_pdf(&source, 3);

        assert!(matches!(paginate(&source, 0), Err(PaginatorError::InvalidPageLimit)));
    }

    #[test]
    fn unreadable_source_is_a_read_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("broken.pdf");
        fs::write(&source, b"this is not a pdf").expect("write");

        assert!(matches!(paginate(&source, 2), Err(PaginatorError::DocumentRead { .. })));
        assert!(!tmp.path().join("broken_chunks").exists());
    }

    #[test]
    fn failed_run_leaves_no_chunks_or_staging() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("exam.pdf");
        write_marked_pdf(&source, 4);

        // A non-empty destination cannot be replaced, so the final rename fails.
        let destination = tmp.path().join("exam_chunks");
        fs::create_dir(&destination).expect("mkdir");
        fs::write(destination.join("keep.txt"), b"existing").expect("write");

        assert!(matches!(paginate(&source, 2), Err(PaginatorError::Io(_))));

        let leftovers: Vec<String> = fs::read_dir(tmp.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert!(leftovers.iter().all(|name| !name.contains("staging")), "{leftovers:?}");
        assert!(!chunk_path(&destination, 1).exists());
    }

    #[test]
    fn rerun_into_empty_destination_reproduces_partitioning() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("exam.pdf");
        write_marked_pdf(&source, 5);

        assert_eq!(paginate(&source, 2).expect("first run"), 3);
        let dir = tmp.path().join("exam_chunks");
        let first: Vec<Vec<i64>> = (1..=3).map(|n| page_markers(&chunk_path(&dir, n))).collect();

        fs::remove_dir_all(&dir).expect("clear");
        fs::create_dir(&dir).expect("empty destination");

        assert_eq!(paginate(&source, 2).expect("second run"), 3);
        let second: Vec<Vec<i64>> = (1..=3).map(|n| page_markers(&chunk_path(&dir, n))).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }
}
