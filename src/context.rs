//! Context Builder: turns a resolved environment plus a test
//! case into the inputs the Query-Executor Bridge needs.

use ahash::AHashMap;
use std::path::Path;

use crate::engine::{Item, ItemValue, QueryEngine, QueryOutcome, QueryRequest, Sequence};
use crate::error::Error;
use crate::pending::ResolvedEnvironment;
use crate::testcase::{EnvironmentSpec, Test, TestCase};

pub const UNDEFINED_BASE_URI: &str = "#UNDEFINED";

/// Everything the primary query (and, transitively, every helper query) is
/// run against.
pub struct ExecutionContext {
    pub query: String,
    pub static_base_uri: Option<String>,
    pub context_item: Option<Sequence>,
    pub variables: AHashMap<String, Sequence>,
}

pub struct ContextBuilder<'a> {
    pub engine: &'a dyn QueryEngine,
    pub test_case: &'a TestCase,
    pub resolved: &'a ResolvedEnvironment,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(
        engine: &'a dyn QueryEngine,
        test_case: &'a TestCase,
        resolved: &'a ResolvedEnvironment,
    ) -> Self {
        Self {
            engine,
            test_case,
            resolved,
        }
    }

    /// Resolves the query string, static base URI, context item, and
    /// external variables. Note: engine calls made here (parsing
    /// documents/collections, evaluating param `select` expressions) are
    /// deliberately not timed into the verdict's `Timings`, which scopes
    /// summed timings to the primary query plus assertion-evaluation
    /// helpers only.
    pub async fn build(&self) -> Result<ExecutionContext, Error> {
        let query = self.resolve_query()?;
        let static_base_uri = self.resolve_static_base_uri();
        let context_item = self.build_context_item().await?;
        let variables = self.build_variables().await?;

        Ok(ExecutionContext {
            query,
            static_base_uri,
            context_item,
            variables,
        })
    }

    fn resolve_query(&self) -> Result<String, Error> {
        match &self.test_case.test {
            Some(Test::Inline(text)) => Ok(text.clone()),
            Some(Test::Path(path)) => self.resolve_bytes_as_string(path),
            None => Err(Error::InvalidTestCase),
        }
    }

    fn resolve_static_base_uri(&self) -> Option<String> {
        let raw = self
            .test_case
            .environment
            .as_ref()
            .and_then(|env| env.static_base_uri.as_deref());
        match raw {
            Some(uri) if uri != UNDEFINED_BASE_URI => Some(uri.to_string()),
            _ => None,
        }
    }

    /// The context sequence: empty if the environment is explicitly named
    /// "empty", otherwise the parsed document of
    /// the role-"." source if one is present, otherwise empty.
    async fn build_context_item(&self) -> Result<Option<Sequence>, Error> {
        let Some(env) = &self.test_case.environment else {
            return Ok(None);
        };
        if env.name.as_deref() == Some("empty") {
            return Ok(None);
        }
        let Some(source) = env.sources.iter().find(|s| s.role.as_deref() == Some(".")) else {
            return Ok(None);
        };
        let bytes = self.resolve_bytes(&source.file)?;
        let sequence = self
            .engine
            .parse_xml(&bytes, source.uri.as_deref())
            .await?;
        Ok(Some(sequence))
    }

    /// External variables: one entry per available document (sources with
    /// no role and a URI), one per collection (sources grouped under a
    /// collection URI, accumulated in declaration order), one per available
    /// text resource (decoded per its declared encoding), and one per
    /// `<param>`.
    async fn build_variables(&self) -> Result<AHashMap<String, Sequence>, Error> {
        let mut variables = AHashMap::default();
        let Some(env) = &self.test_case.environment else {
            return Ok(variables);
        };

        self.bind_available_documents(env, &mut variables).await?;
        self.bind_collections(env, &mut variables).await?;
        self.bind_available_texts(env, &mut variables).await?;
        self.bind_params(env, &mut variables).await?;

        Ok(variables)
    }

    async fn bind_available_documents(
        &self,
        env: &EnvironmentSpec,
        variables: &mut AHashMap<String, Sequence>,
    ) -> Result<(), Error> {
        for source in &env.sources {
            if source.role.is_some() {
                continue;
            }
            let Some(uri) = &source.uri else { continue };
            let bytes = self.resolve_bytes(&source.file)?;
            let sequence = self.engine.parse_xml(&bytes, Some(uri)).await?;
            variables.insert(format!("doc:{uri}"), sequence);
        }
        Ok(())
    }

    async fn bind_collections(
        &self,
        env: &EnvironmentSpec,
        variables: &mut AHashMap<String, Sequence>,
    ) -> Result<(), Error> {
        for collection in &env.collections {
            let mut items = Vec::new();
            for source in &collection.sources {
                let bytes = self.resolve_bytes(&source.file)?;
                let sequence = self.engine.parse_xml(&bytes, source.uri.as_deref()).await?;
                items.extend(sequence.into_items());
            }
            variables.insert(format!("collection:{}", collection.uri), Sequence::new(items));
        }
        Ok(())
    }

    /// Decodes each resource with its declared encoding (UTF-8 if absent)
    /// and binds the text keyed by the resource's URI.
    async fn bind_available_texts(
        &self,
        env: &EnvironmentSpec,
        variables: &mut AHashMap<String, Sequence>,
    ) -> Result<(), Error> {
        for resource in &env.resources {
            let bytes = self.resolve_bytes(&resource.file)?;
            let text = decode_with_charset(&bytes, resource.encoding.as_deref())?;
            variables.insert(
                format!("text:{}", resource.uri),
                Sequence::new(vec![Item {
                    value: ItemValue::String(text),
                }]),
            );
        }
        Ok(())
    }

    async fn bind_params(
        &self,
        env: &EnvironmentSpec,
        variables: &mut AHashMap<String, Sequence>,
    ) -> Result<(), Error> {
        for param in &env.params {
            let value = match &param.select {
                None => Sequence::empty(),
                Some(_) if param.as_type.as_deref() == Some("empty") => Sequence::empty(),
                Some(select) => {
                    let outcome = self
                        .engine
                        .execute_query(QueryRequest {
                            query: select,
                            static_base_uri: None,
                            context_item: None,
                            variables,
                        })
                        .await?;
                    match outcome {
                        QueryOutcome::Success { result, .. } => result,
                        QueryOutcome::Failure { error, .. } => {
                            return Err(anyhow::anyhow!(
                                "param {} select failed: {} ({})",
                                param.name,
                                error.message,
                                error.code
                            )
                            .into())
                        }
                    }
                }
            };
            variables.insert(param.name.clone(), value);
        }
        Ok(())
    }

    fn resolve_bytes(&self, path: &Path) -> Result<std::sync::Arc<[u8]>, Error> {
        self.resolved
            .schemas
            .get(path)
            .or_else(|| self.resolved.sources.get(path))
            .or_else(|| self.resolved.resources.get(path))
            .cloned()
            .ok_or_else(|| Error::MissingResolvedPath(path.to_path_buf()))
    }

    fn resolve_bytes_as_string(&self, path: &Path) -> Result<String, Error> {
        let bytes = self
            .resolved
            .query
            .clone()
            .ok_or_else(|| Error::MissingResolvedPath(path.to_path_buf()))?;
        String::from_utf8(bytes.to_vec()).map_err(|e| anyhow::Error::from(e).into())
    }
}

/// Decodes `bytes` per a declared charset label (IANA name, default UTF-8).
/// An unrecognized label is the unrecognized-charset edge case.
fn decode_with_charset(bytes: &[u8], encoding: Option<&str>) -> Result<String, Error> {
    let label = encoding.unwrap_or("UTF-8");
    let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| Error::UnknownCharset(label.to_string()))?;
    let (text, _, _had_errors) = encoding.decode(bytes);
    Ok(text.into_owned())
}
