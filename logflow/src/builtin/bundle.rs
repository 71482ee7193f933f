//! The `bundle` plugin: a rendered sub-graph presented as one plugin.

use super::adapters::{BundleInput, BUNDLE_INPUT_TYPE, BUNDLE_OUTPUT_TYPE};
use crate::config::deserialize_outputs;
use crate::entry::Entry;
use crate::errors::{BundleError, LogflowError, PluginError};
use crate::graph::{PluginConfigGraph, PluginGraph};
use crate::lifecycle::Lifecycle;
use crate::plugin::{BuildContext, OutputSlot, Plugin, PluginIdentity, PluginSpec};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Configuration of the `bundle` plugin type.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleConfig {
    /// Plugin id.
    pub id: String,
    /// Downstream plugin ids.
    #[serde(default, deserialize_with = "deserialize_outputs")]
    pub output: Vec<String>,
    /// Type of the bundle definition to render.
    pub bundle_type: String,
    /// Parameters passed to the definition.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl PluginSpec for BundleConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn outputs(&self) -> &[String] {
        &self.output
    }

    fn build(
        &self,
        identity: PluginIdentity,
        ctx: &BuildContext,
    ) -> Result<Arc<dyn Plugin>, PluginError> {
        Ok(Bundle::compose(identity, &self.bundle_type, &self.params, ctx)?)
    }
}

/// Which sides of a bundle are connected to the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleShape {
    /// No adapters: the bundle neither receives nor emits.
    Neither,
    /// Only a `bundle_input`: the bundle receives entries.
    InputOnly,
    /// Only a `bundle_output`: the bundle emits entries.
    OutputOnly,
    /// Both adapters.
    Both,
}

impl BundleShape {
    fn new(has_input: bool, has_output: bool) -> Self {
        match (has_input, has_output) {
            (false, false) => Self::Neither,
            (true, false) => Self::InputOnly,
            (false, true) => Self::OutputOnly,
            (true, true) => Self::Both,
        }
    }

    /// Whether the bundle accepts entries.
    #[must_use]
    pub fn can_process(self) -> bool {
        matches!(self, Self::InputOnly | Self::Both)
    }

    /// Whether the bundle emits entries.
    #[must_use]
    pub fn can_output(self) -> bool {
        matches!(self, Self::OutputOnly | Self::Both)
    }
}

impl fmt::Display for BundleShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Neither => "neither",
            Self::InputOnly => "input",
            Self::OutputOnly => "output",
            Self::Both => "both",
        })
    }
}

/// A built bundle.
///
/// External entries go to the inner input adapter; entries reaching the
/// inner output adapter go to the bundle's own outputs. Starting and
/// stopping the bundle starts and stops the inner graph.
#[derive(Debug)]
pub struct Bundle {
    identity: PluginIdentity,
    bundle_type: String,
    shape: BundleShape,
    digest: String,
    graph: PluginGraph,
    lifecycle: Lifecycle,
    input: Option<Arc<BundleInput>>,
    outputs: OutputSlot,
}

impl Bundle {
    /// Renders, decodes and builds a bundle definition.
    ///
    /// # Errors
    ///
    /// Fails if the definition is unknown, rendering or decoding fails, the
    /// inner graph is invalid or fails to build, nesting is too deep, or more
    /// than one adapter of either kind exists.
    pub fn compose(
        identity: PluginIdentity,
        bundle_type: &str,
        params: &Map<String, Value>,
        ctx: &BuildContext,
    ) -> Result<Arc<Self>, BundleError> {
        let definition = ctx.bundles().get(bundle_type)?;
        let rendered = definition
            .render(params)
            .map_err(|source| BundleError::Render {
                bundle_type: bundle_type.to_string(),
                source,
            })?;
        let nested = ctx.enter_bundle(identity.id(), bundle_type)?;

        let configs = ctx
            .registry()
            .decode_document(rendered.text())
            .map_err(|source| BundleError::Decode {
                bundle_type: bundle_type.to_string(),
                source,
            })?;
        let inner_error = |err: LogflowError| BundleError::Graph {
            bundle_type: bundle_type.to_string(),
            source: Box::new(err),
        };
        let graph = PluginConfigGraph::new(configs)
            .map_err(|err| inner_error(err.into()))?
            .build(&nested)
            .map_err(inner_error)?;

        let adapters = nested.adapters().cloned().unwrap_or_default();
        let mut inputs = adapters.inputs();
        let mut outputs = adapters.outputs();
        for (adapter_type, count) in [
            (BUNDLE_INPUT_TYPE, inputs.len()),
            (BUNDLE_OUTPUT_TYPE, outputs.len()),
        ] {
            if count > 1 {
                return Err(BundleError::DuplicateAdapter {
                    bundle_type: bundle_type.to_string(),
                    adapter_type,
                    count,
                });
            }
        }
        let input = inputs.pop();
        let output = outputs.pop();

        let shape = BundleShape::new(input.is_some(), output.is_some());
        let lifecycle = Lifecycle::new(&graph).with_span(nested.span().clone());
        let bundle = Arc::new(Self {
            identity,
            bundle_type: bundle_type.to_string(),
            shape,
            digest: rendered.digest(),
            graph,
            lifecycle,
            input,
            outputs: OutputSlot::new(),
        });
        if let Some(output) = output {
            output.attach(Arc::downgrade(&bundle));
        }

        info!(
            parent: nested.span(),
            shape = %shape,
            digest = %bundle.digest,
            plugins = bundle.graph.len(),
            "composed bundle"
        );
        Ok(bundle)
    }

    /// Returns the bundle type.
    #[must_use]
    pub fn bundle_type(&self) -> &str {
        &self.bundle_type
    }

    /// Returns which sides are connected.
    #[must_use]
    pub fn shape(&self) -> BundleShape {
        self.shape
    }

    /// Returns the SHA-256 of the rendered definition.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Returns the inner plugin graph.
    #[must_use]
    pub fn graph(&self) -> &PluginGraph {
        &self.graph
    }

    /// Returns the inner lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub(crate) async fn emit(&self, entry: Entry) -> Result<(), PluginError> {
        self.outputs.emit(entry).await
    }
}

#[async_trait]
impl Plugin for Bundle {
    fn id(&self) -> &str {
        self.identity.id()
    }

    fn plugin_type(&self) -> &str {
        self.identity.plugin_type()
    }

    async fn start(&self) -> Result<(), PluginError> {
        Ok(self.lifecycle.start().await?)
    }

    async fn stop(&self) -> Result<(), PluginError> {
        Ok(self.lifecycle.stop().await?)
    }

    fn can_output(&self) -> bool {
        self.shape.can_output()
    }

    fn outputs(&self) -> Vec<Arc<dyn Plugin>> {
        self.outputs.targets()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Plugin>>) -> Result<(), PluginError> {
        if outputs.is_empty() {
            return Ok(());
        }
        if !self.can_output() {
            return Err(PluginError::NotAnOutputter {
                plugin_id: self.id().to_string(),
            });
        }
        self.outputs.set(self.id(), outputs)
    }

    fn can_process(&self) -> bool {
        self.shape.can_process()
    }

    async fn process(&self, entry: Entry) -> Result<(), PluginError> {
        match &self.input {
            Some(input) => input.process(entry).await,
            None => Err(PluginError::NotProcessable {
                plugin_id: self.id().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleCatalog, BundleDefinition};
    use crate::testing::{build_context_with_bundles, Journal, RecordingPlugin};
    use serde_json::json;

    fn catalog(definitions: &[&str]) -> BundleCatalog {
        BundleCatalog::from_definitions(
            definitions
                .iter()
                .map(|text| BundleDefinition::from_yaml_str(text).unwrap()),
        )
    }

    const PASSTHROUGH: &str = r#"
bundle_type: passthrough
parameters:
  tag:
    type: string
    default: none
template: |
  plugins:
    - id: in
      type: bundle_input
      output: tagger
    - id: tagger
      type: mock
      set: tag
      value: "{{ .tag }}"
      output: out
    - id: out
      type: bundle_output
"#;

    const SOURCE_ONLY: &str = r#"
bundle_type: source
template: |
  plugins:
    - id: gen
      type: mock
      output: out
    - id: out
      type: bundle_output
"#;

    const SINK_ONLY: &str = r#"
bundle_type: sink_only
template: |
  plugins:
    - id: in
      type: bundle_input
      output: collector
    - id: collector
      type: mock
      can_output: false
"#;

    const SEALED: &str = r#"
bundle_type: sealed
template: |
  plugins:
    - id: a
      type: mock
"#;

    const TWO_INPUTS: &str = r#"
bundle_type: two_inputs
template: |
  plugins:
    - id: in1
      type: bundle_input
    - id: in2
      type: bundle_input
"#;

    fn compose(journal: &Journal, bundles: BundleCatalog, bundle_type: &str, params: Value) -> Result<Arc<Bundle>, BundleError> {
        let ctx = build_context_with_bundles(journal, bundles).unwrap();
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Bundle::compose(PluginIdentity::new("b", "bundle"), bundle_type, &params, &ctx)
    }

    #[tokio::test]
    async fn test_passthrough_bundle_routes_entries() {
        let journal = Journal::new();
        let bundle = compose(&journal, catalog(&[PASSTHROUGH]), "passthrough", json!({"tag": "hot"})).unwrap();
        assert_eq!(bundle.shape(), BundleShape::Both);
        assert!(bundle.can_process());
        assert!(bundle.can_output());

        bundle
            .set_outputs(vec![Arc::new(RecordingPlugin::sink("sink", journal.clone()))])
            .unwrap();
        bundle.start().await.unwrap();
        bundle
            .process(Entry::with_record(json!({"msg": "hi"})))
            .await
            .unwrap();
        bundle.stop().await.unwrap();

        assert_eq!(journal.records("sink"), vec![json!({"msg": "hi", "tag": "hot"})]);
        assert_eq!(journal.events(), vec!["start:tagger", "stop:tagger"]);
    }

    #[test]
    fn test_shapes() {
        let journal = Journal::new();
        let bundles = || catalog(&[SOURCE_ONLY, SEALED]);

        let source = compose(&journal, bundles(), "source", json!({})).unwrap();
        assert_eq!(source.shape(), BundleShape::OutputOnly);
        assert!(!source.can_process());
        assert!(source.can_output());

        let sealed = compose(&journal, bundles(), "sealed", json!({})).unwrap();
        assert_eq!(sealed.shape(), BundleShape::Neither);
        assert!(!sealed.can_process());
        assert!(!sealed.can_output());
        assert!(sealed.set_outputs(Vec::new()).is_ok());
        assert!(matches!(
            sealed.set_outputs(vec![Arc::new(RecordingPlugin::sink("x", journal.clone()))]),
            Err(PluginError::NotAnOutputter { .. })
        ));
    }

    #[tokio::test]
    async fn test_output_only_bundle_emits_inner_entries() {
        let journal = Journal::new();
        let bundle = compose(&journal, catalog(&[SOURCE_ONLY]), "source", json!({})).unwrap();
        bundle
            .set_outputs(vec![Arc::new(RecordingPlugin::sink("sink", journal.clone()))])
            .unwrap();

        bundle.start().await.unwrap();
        bundle
            .graph()
            .get("gen")
            .unwrap()
            .process(Entry::with_record(json!({"from": "inside"})))
            .await
            .unwrap();
        assert!(bundle.process(Entry::new()).await.is_err());
        bundle.stop().await.unwrap();

        assert_eq!(journal.records("sink"), vec![json!({"from": "inside"})]);
    }

    #[tokio::test]
    async fn test_input_only_bundle_forwards_external_entries() {
        let journal = Journal::new();
        let bundle = compose(&journal, catalog(&[SINK_ONLY]), "sink_only", json!({})).unwrap();
        assert_eq!(bundle.shape(), BundleShape::InputOnly);
        assert!(bundle.can_process());
        assert!(!bundle.can_output());

        bundle.start().await.unwrap();
        bundle
            .process(Entry::with_record(json!({"from": "outside"})))
            .await
            .unwrap();
        bundle.stop().await.unwrap();

        assert_eq!(journal.records("collector"), vec![json!({"from": "outside"})]);
        assert_eq!(journal.events(), vec!["start:collector", "stop:collector"]);
    }

    #[test]
    fn test_duplicate_input_adapters_rejected() {
        let journal = Journal::new();
        let err = compose(&journal, catalog(&[TWO_INPUTS]), "two_inputs", json!({})).unwrap_err();

        assert!(matches!(
            err,
            BundleError::DuplicateAdapter { adapter_type: "bundle_input", count: 2, .. }
        ));
        assert!(err
            .to_string()
            .contains("only one plugin of type bundle_input can exist in a bundle"));
    }

    #[test]
    fn test_unknown_bundle_type() {
        let journal = Journal::new();
        let err = compose(&journal, BundleCatalog::default(), "nope", json!({})).unwrap_err();
        assert!(matches!(err, BundleError::NotFound { .. }));
    }

    #[test]
    fn test_render_failure_is_reported() {
        let journal = Journal::new();
        let err = compose(&journal, catalog(&[PASSTHROUGH]), "passthrough", json!({"bogus": 1})).unwrap_err();
        assert!(matches!(err, BundleError::Render { .. }));
    }

    #[test]
    fn test_inner_graph_errors_are_wrapped() {
        let broken = r#"
bundle_type: broken
template: |
  plugins:
    - id: a
      type: mock
      output: ghost
"#;
        let journal = Journal::new();
        let err = compose(&journal, catalog(&[broken]), "broken", json!({})).unwrap_err();
        assert!(matches!(err, BundleError::Graph { .. }));
        assert!(err.to_string().contains("undefined output reference"));
    }

    #[test]
    fn test_self_nesting_hits_depth_limit() {
        let recursive = r#"
bundle_type: recursive
template: |
  plugins:
    - id: inner
      type: bundle
      bundle_type: recursive
"#;
        let journal = Journal::new();
        let err = compose(&journal, catalog(&[recursive]), "recursive", json!({})).unwrap_err();
        assert!(err.to_string().contains("maximum bundle nesting depth"));
    }
}
