//! Bundle persistence: one file per bundle, a header page followed by document
//! pages. Rewrites are atomic (write to `{path}.tmp`, then rename).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::errors::{Result, StorageError};
use crate::types::DocumentId;
use crate::utils::num::u32_to_usize;

const MAGIC: u32 = 0x4255_4E44; // "BUND" in spirit
const FORMAT_VERSION: u32 = 1;
const PAGE_SIZE: usize = crate::page::PAGE_SIZE;

/// A named collection of documents backed by a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub name: String,
    pub field_definitions: BTreeMap<String, FieldDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub required: bool,
    pub unique: bool,
}

pub struct Bundle {
    pub metadata: BundleMetadata,
    pub documents: BTreeMap<DocumentId, Document>,
}

impl Bundle {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: BundleMetadata { name: name.into(), field_definitions: BTreeMap::new() },
            documents: BTreeMap::new(),
        }
    }

    /// Lazy, restartable iteration over documents; used by index builders.
    pub fn iterate_documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }
}

/// Reads and writes bundle files under a configured data directory.
pub struct BundleStore {
    data_dir: PathBuf,
}

impl BundleStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.bnd"))
    }

    #[must_use]
    pub fn bundle_file_exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    pub fn create_bundle_file(&self, bundle: &Bundle) -> Result<()> {
        let path = self.path_for(&bundle.metadata.name);
        if path.exists() {
            return Err(StorageError::DuplicateBundle(bundle.metadata.name.clone()));
        }
        self.rewrite(bundle)
    }

    pub fn remove_bundle_file(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        fs::remove_file(&path).map_err(|e| StorageError::io(path.display().to_string(), e))
    }

    /// Full rewrite: encode header + document pages, write to a temp file, rename
    /// over the original. See SPEC_FULL.md design notes on bundle rewrite atomicity.
    pub fn rewrite(&self, bundle: &Bundle) -> Result<()> {
        let path = self.path_for(&bundle.metadata.name);
        let tmp_path = path.with_extension("bnd.tmp");
        let mut file = File::create(&tmp_path)
            .map_err(|e| StorageError::io(tmp_path.display().to_string(), e))?;

        let meta_bytes = bincode::serde::encode_to_vec(&bundle.metadata, bincode::config::standard())?;
        let mut header = Vec::with_capacity(PAGE_SIZE);
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        header.extend_from_slice(&(bundle.documents.len() as u32).to_le_bytes());
        header.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
        header.extend_from_slice(&meta_bytes);
        if header.len() > PAGE_SIZE {
            return Err(StorageError::PageOverflow { size: header.len(), max: PAGE_SIZE });
        }
        header.resize(PAGE_SIZE, 0);
        file.write_all(&header).map_err(|e| StorageError::io(tmp_path.display().to_string(), e))?;

        let mut page = Vec::with_capacity(PAGE_SIZE);
        let mut docs_in_page: u32 = 0;
        let mut body = Vec::new();

        let flush_page =
            |file: &mut File, page: &mut Vec<u8>, docs_in_page: u32, body: &mut Vec<u8>| -> Result<()> {
                page.clear();
                page.extend_from_slice(&docs_in_page.to_le_bytes());
                page.extend_from_slice(body);
                if page.len() > PAGE_SIZE {
                    return Err(StorageError::PageOverflow { size: page.len(), max: PAGE_SIZE });
                }
                page.resize(PAGE_SIZE, 0);
                file.write_all(page)
                    .map_err(|e| StorageError::io(tmp_path.display().to_string(), e))?;
                body.clear();
                Ok(())
            };

        for doc in bundle.documents.values() {
            let encoded = bson::to_vec(&doc.to_bson())?;
            if encoded.len() + 4 > PAGE_SIZE - 4 {
                return Err(StorageError::DocumentTooLarge {
                    doc_id: doc.id.to_string(),
                    size: encoded.len(),
                });
            }
            let would_be = 4 + body.len() + 4 + encoded.len();
            if would_be > PAGE_SIZE && docs_in_page > 0 {
                flush_page(&mut file, &mut page, docs_in_page, &mut body)?;
                docs_in_page = 0;
            }
            body.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
            body.extend_from_slice(&encoded);
            docs_in_page += 1;
        }
        if docs_in_page > 0 {
            flush_page(&mut file, &mut page, docs_in_page, &mut body)?;
        }
        file.sync_data().map_err(|e| StorageError::io(tmp_path.display().to_string(), e))?;
        drop(file);
        fs::rename(&tmp_path, &path).map_err(|e| StorageError::io(path.display().to_string(), e))?;
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Bundle> {
        let path = self.path_for(name);
        let mut file =
            File::open(&path).map_err(|e| StorageError::io(path.display().to_string(), e))?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw).map_err(|e| StorageError::io(path.display().to_string(), e))?;
        if raw.len() < PAGE_SIZE {
            return Err(StorageError::MalformedPage("bundle header truncated".into()));
        }
        let u32_at = |b: &[u8], o: usize| u32::from_le_bytes(b[o..o + 4].try_into().unwrap());
        let magic = u32_at(&raw, 0);
        if magic != MAGIC {
            return Err(StorageError::MalformedPage(format!("bad bundle magic {magic:#x}")));
        }
        let meta_len = u32_to_usize(u32_at(&raw, 12));
        let meta_bytes = &raw[16..16 + meta_len];
        let (metadata, _): (BundleMetadata, _) =
            bincode::serde::decode_from_slice(meta_bytes, bincode::config::standard())?;

        let mut documents = BTreeMap::new();
        let mut offset = PAGE_SIZE;
        while offset + PAGE_SIZE <= raw.len() {
            let page = &raw[offset..offset + PAGE_SIZE];
            let docs_in_page = u32_at(page, 0);
            let mut cursor = 4usize;
            for _ in 0..docs_in_page {
                let doc_len = u32_to_usize(u32_at(page, cursor));
                cursor += 4;
                let doc_bytes = &page[cursor..cursor + doc_len];
                cursor += doc_len;
                let bson_doc = bson::from_slice::<bson::Document>(doc_bytes)?;
                let doc = Document::from_bson(bson_doc)?;
                documents.insert(doc.id, doc);
            }
            offset += PAGE_SIZE;
        }
        Ok(Bundle { metadata, documents })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
