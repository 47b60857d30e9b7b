//! Cache-or-compute driver.
//!
//! For every preprocessing option the normalized corpus is read from (or
//! written to) `data_{option}.json`; for every model the embedding matrix and
//! the index are read from (or written to) files keyed by option and model
//! name. Whenever an artifact is recomputed, everything derived from it is
//! recomputed too, so a matrix and its index always come from the same corpus.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use crate::config::Config;
use crate::preprocess::{PreprocessOption, TextNormalizer};
use crate::profiles::{self, Profile, ProfileError};
use crate::report::QueryReport;
use crate::semantic::{
    Embedder, EmbedderLoader, EmbeddingError, EmbeddingMatrix, IndexError, ModelSpec,
    VectorIndex, VectorStorage, VectorStorageError,
};
use crate::storage::{self, BackendLocal, JsonStoreError, StorageManager};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Profiles(#[from] ProfileError),

    #[error(transparent)]
    Store(#[from] JsonStoreError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error in {artifact}: {source}")]
    Storage {
        artifact: String,
        #[source]
        source: VectorStorageError,
    },

    #[error("{artifact} has {got} rows but the dataset has {expected} profiles")]
    CorpusMismatch {
        artifact: String,
        expected: usize,
        got: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn text_artifact(option: PreprocessOption) -> String {
    format!("data_{option}.json")
}

pub fn embeddings_artifact(option: PreprocessOption, model_name: &str) -> String {
    format!("{option}_{model_name}_embeddings.bin")
}

pub fn index_artifact(option: PreprocessOption, model_name: &str) -> String {
    format!("{option}_{model_name}.index")
}

/// Profiles plus their cleaned summaries, index-aligned.
pub struct Corpus {
    pub profiles: Vec<Profile>,
    pub summaries: Vec<String>,
}

impl Corpus {
    pub fn from_profiles(profiles: Vec<Profile>) -> Self {
        let summaries = profiles::clean_summaries(profiles::make_summaries(&profiles));
        Self {
            profiles,
            summaries,
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Normalized corpus for one option.
pub struct NormalizedCorpus {
    pub option: PreprocessOption,
    pub texts: Vec<String>,
    /// True when the texts were computed in this run rather than read from cache
    pub recomputed: bool,
}

/// Index for one (option, model) pair.
pub struct PreparedModel {
    pub spec: ModelSpec,
    pub option: PreprocessOption,
    pub index: VectorIndex,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    loader: &'a dyn EmbedderLoader,
    store: BackendLocal,
    normalizer: TextNormalizer,
    /// Loaded models keyed by model name, shared by every option.
    embedders: RefCell<HashMap<String, Rc<dyn Embedder>>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, loader: &'a dyn EmbedderLoader) -> Result<Self, PipelineError> {
        Ok(Self {
            config,
            loader,
            store: BackendLocal::new(config.base_path())?,
            normalizer: TextNormalizer::new(),
            embedders: RefCell::new(HashMap::new()),
        })
    }

    /// The embedder for `spec`, loaded on first use.
    fn embedder(&self, spec: &ModelSpec) -> Result<Rc<dyn Embedder>, EmbeddingError> {
        if let Some(embedder) = self.embedders.borrow().get(&spec.model_name) {
            return Ok(Rc::clone(embedder));
        }

        let embedder: Rc<dyn Embedder> = Rc::from(self.loader.load(spec)?);
        self.embedders
            .borrow_mut()
            .insert(spec.model_name.clone(), Rc::clone(&embedder));
        Ok(embedder)
    }

    pub fn load_corpus(&self) -> Result<Corpus, PipelineError> {
        let profiles = profiles::load_profiles(&self.config.dataset_path())?;
        let corpus = Corpus::from_profiles(profiles);
        if corpus.is_empty() {
            log::warn!("{} holds no profiles", self.config.dataset_path().display());
        }
        Ok(corpus)
    }

    /// Normalized texts for `option`, from cache when present.
    pub fn normalized_corpus(
        &self,
        option: PreprocessOption,
        corpus: &Corpus,
    ) -> Result<NormalizedCorpus, PipelineError> {
        let ident = text_artifact(option);

        let (texts, recomputed) = match storage::read_json::<Vec<String>>(&self.store, &ident) {
            Ok(texts) => {
                log::debug!("Loaded {} normalized texts from {}", texts.len(), ident);
                (texts, false)
            }
            Err(e) if e.is_not_found() => {
                log::info!("{} not found, normalizing corpus", ident);
                let texts = self.normalizer.normalize_corpus(option, &corpus.summaries);
                storage::write_json(&self.store, &ident, &texts)?;
                (texts, true)
            }
            Err(e) => return Err(e.into()),
        };

        check_rows(&ident, corpus.len(), texts.len())?;

        Ok(NormalizedCorpus {
            option,
            texts,
            recomputed,
        })
    }

    /// Load or build the embedding matrix and index for one model.
    pub fn prepare_model(
        &self,
        spec: &ModelSpec,
        corpus: &NormalizedCorpus,
    ) -> Result<PreparedModel, PipelineError> {
        let option = corpus.option;
        let model_id = spec.model_id_hash();

        let matrix_ident = embeddings_artifact(option, &spec.model_name);
        let matrix_storage = VectorStorage::new(self.store.path(&matrix_ident));

        let cached_matrix = if corpus.recomputed {
            None
        } else {
            self.load_cached(&matrix_ident, &matrix_storage, |s| {
                s.load_matrix(&model_id, None)
            })?
        };

        let (matrix, matrix_rebuilt) = match cached_matrix {
            Some(matrix) => (matrix, false),
            None => {
                let matrix = self.embedder(spec)?.embed_corpus(&corpus.texts)?;
                log::info!(
                    "Embeddings shape: ({}, {})",
                    matrix.rows(),
                    matrix.dimensions()
                );
                matrix_storage
                    .save_matrix(&matrix, &model_id)
                    .map_err(|source| storage_error(&matrix_ident, source))?;
                (matrix, true)
            }
        };
        check_rows(&matrix_ident, corpus.texts.len(), matrix.rows())?;

        let index_ident = index_artifact(option, &spec.model_name);
        let index_storage = VectorStorage::new(self.store.path(&index_ident));

        let cached_index = if matrix_rebuilt {
            None
        } else {
            self.load_cached(&index_ident, &index_storage, |s| {
                s.load_index(&model_id, Some(matrix.dimensions()), self.config.metric)
            })?
        };

        let index = match cached_index {
            Some(index) => index,
            None => build_index(&matrix, &index_ident, &index_storage, spec, self.config)?,
        };
        check_rows(&index_ident, corpus.texts.len(), index.len())?;

        Ok(PreparedModel {
            spec: spec.clone(),
            option,
            index,
        })
    }

    /// Read a cached artifact; `None` means it has to be rebuilt.
    fn load_cached<T>(
        &self,
        ident: &str,
        storage: &VectorStorage,
        load: impl FnOnce(&VectorStorage) -> Result<T, VectorStorageError>,
    ) -> Result<Option<T>, PipelineError> {
        if !storage.exists() {
            return Ok(None);
        }

        match load(storage) {
            Ok(value) => {
                log::debug!("Loaded {} from cache", ident);
                Ok(Some(value))
            }
            Err(e) if e.is_incompatible() => {
                log::warn!("{} is incompatible ({}), rebuilding", ident, e);
                Ok(None)
            }
            Err(e) => Err(storage_error(ident, e)),
        }
    }

    /// Normalize, embed and search one query against a prepared model.
    pub fn search(
        &self,
        prepared: &PreparedModel,
        corpus: &Corpus,
        query: &str,
    ) -> Result<QueryReport, PipelineError> {
        let normalized = self
            .normalizer
            .normalize(prepared.option, &profiles::clean_summary(query));

        let query_embedding = self.embedder(&prepared.spec)?.embed(&normalized)?;
        log::debug!("Query embedding shape: (1, {})", query_embedding.len());

        let neighbors = prepared.index.search(&query_embedding, self.config.top_k)?;
        log::debug!(
            "Distances: {:?}",
            neighbors.iter().map(|n| n.distance).collect::<Vec<_>>()
        );

        Ok(QueryReport::new(
            query,
            &normalized,
            &prepared.spec.model_name,
            prepared.option,
            &neighbors,
            &corpus.profiles,
        ))
    }

    /// Build every missing artifact for the given options and models.
    pub fn build(
        &self,
        options: &[PreprocessOption],
        models: &[ModelSpec],
    ) -> Result<(), PipelineError> {
        let corpus = self.load_corpus()?;
        for &option in options {
            let _option_span = tracing::info_span!("option", code = option.code()).entered();
            log::info!("Option: {} ({})", option, option.describe());
            let normalized = self.normalized_corpus(option, &corpus)?;
            for spec in models {
                let _model_span = tracing::info_span!("model", name = %spec.model_name).entered();
                log::info!("Model: {}", spec.model_name);
                let prepared = self.prepare_model(spec, &normalized)?;
                log::info!(
                    "{} ready with {} vectors",
                    index_artifact(option, &spec.model_name),
                    prepared.index.len()
                );
            }
        }
        Ok(())
    }

    /// Build what is missing, then answer every query for every option and model.
    pub fn run<W: Write>(
        &self,
        options: &[PreprocessOption],
        models: &[ModelSpec],
        queries: &[String],
        out: &mut W,
    ) -> Result<Vec<QueryReport>, PipelineError> {
        let corpus = self.load_corpus()?;
        let mut reports = Vec::new();

        for &option in options {
            let _option_span = tracing::info_span!("option", code = option.code()).entered();
            log::info!("Option: {} ({})", option, option.describe());
            let normalized = self.normalized_corpus(option, &corpus)?;

            for spec in models {
                let _model_span = tracing::info_span!("model", name = %spec.model_name).entered();
                log::info!("Model: {}", spec.model_name);
                let prepared = self.prepare_model(spec, &normalized)?;

                for query in queries.iter().filter(|q| !q.trim().is_empty()) {
                    log::info!("Query: {}", query);
                    let report = self.search(&prepared, &corpus, query)?;
                    report.write_to(out)?;
                    reports.push(report);
                }
            }
        }

        Ok(reports)
    }

    /// Answer a single query for one option and model.
    pub fn query<W: Write>(
        &self,
        option: PreprocessOption,
        spec: &ModelSpec,
        query: &str,
        out: &mut W,
    ) -> Result<QueryReport, PipelineError> {
        let corpus = self.load_corpus()?;
        let normalized = self.normalized_corpus(option, &corpus)?;
        let prepared = self.prepare_model(spec, &normalized)?;

        let report = self.search(&prepared, &corpus, query)?;
        report.write_to(out)?;
        Ok(report)
    }
}

fn build_index(
    matrix: &EmbeddingMatrix,
    ident: &str,
    storage: &VectorStorage,
    spec: &ModelSpec,
    config: &Config,
) -> Result<VectorIndex, PipelineError> {
    let index = VectorIndex::build(matrix, config.metric)?;
    storage
        .save_index(&index, &spec.model_id_hash())
        .map_err(|source| storage_error(ident, source))?;
    log::info!("Built {:?} index {} with {} vectors", config.metric, ident, index.len());
    Ok(index)
}

fn storage_error(ident: &str, source: VectorStorageError) -> PipelineError {
    PipelineError::Storage {
        artifact: ident.to_string(),
        source,
    }
}

fn check_rows(ident: &str, expected: usize, got: usize) -> Result<(), PipelineError> {
    if expected != got {
        return Err(PipelineError::CorpusMismatch {
            artifact: ident.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        assert_eq!(text_artifact(PreprocessOption::StopwordsStem), "data_4.json");
        assert_eq!(
            embeddings_artifact(PreprocessOption::None, "SBERT_short"),
            "0_SBERT_short_embeddings.bin"
        );
        assert_eq!(
            index_artifact(PreprocessOption::Lemmatize, "RoBERTa"),
            "1_RoBERTa.index"
        );
    }

    #[test]
    fn test_check_rows() {
        assert!(check_rows("data_0.json", 3, 3).is_ok());
        assert!(matches!(
            check_rows("data_0.json", 3, 2),
            Err(PipelineError::CorpusMismatch { expected: 3, got: 2, .. })
        ));
    }
}
