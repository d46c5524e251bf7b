//! Render graph: the closed node catalog and DAG validation.
//!
//! Nodes are pure: identical inputs and parameters produce identical outputs.
//! All intermediate nodes operate in linear ACEScg; the single `Odt` sink
//! quantizes into the caller's pixel buffer.

use crate::assets::reference::AssetReference;
use crate::color::space::ColorSpace;
use crate::color::transform::FalseColorMap;
use crate::foundation::core::Tick;
use crate::foundation::error::{MetavisError, MvResult};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Index of a node within its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Typed parameter value for feature applications.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum NodeValue {
    /// Integer.
    Int(i64),
    /// Scalar float.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Text.
    Text(String),
    /// Float list (e.g. CDL triples).
    Floats(Vec<f64>),
}

/// Wipe travel direction; encodes axis and sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeDirection {
    /// Incoming clip enters from the left edge.
    LeftToRight,
    /// Incoming clip enters from the right edge.
    RightToLeft,
    /// Incoming clip enters from the top edge.
    TopToBottom,
    /// Incoming clip enters from the bottom edge.
    BottomToTop,
}

/// Blend modes for the `Composite` node (premultiplied-alpha domain).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Premultiplied source-over.
    Over,
    /// Additive.
    Add,
}

/// Watermark overlay parameters.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WatermarkSpec {
    /// Short tag rendered into the corner block.
    pub tag: String,
    /// Stripe/overlay opacity in `[0,1]`.
    pub opacity: f32,
}

/// Procedural generator binding carried by a `SourceProcedural` node.
#[derive(Clone, Debug, PartialEq)]
pub struct ProceduralSpec {
    /// LIGM kind, e.g. `video/zone_plate`.
    pub kind: String,
    /// Decoded query parameters.
    pub query: BTreeMap<String, String>,
}

/// The closed node catalog.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Pull a decoded frame for `asset` at `source` ticks via the clip reader.
    SourceTexture {
        /// Asset to decode.
        asset: AssetReference,
        /// Source-relative time.
        source: Tick,
    },
    /// Analytic generator evaluated at `source` ticks.
    SourceProcedural {
        /// Generator binding.
        spec: ProceduralSpec,
        /// Asset identity, kept for fingerprints and diagnostics.
        asset_id: String,
        /// Source-relative time.
        source: Tick,
    },
    /// Solid black source, used by dips and empty tracks.
    BlackFill,
    /// Input device transform from `from` into working ACEScg.
    Idt {
        /// Color space the input is expressed in.
        from: ColorSpace,
    },
    /// Output device transform into display-referred Rec.709, quantized to
    /// `bit_depth` levels.
    Odt {
        /// Output quantization depth in bits.
        bit_depth: u32,
    },
    /// ASC CDL in working space.
    ColorCdl {
        /// Per-channel slope.
        slope: [f32; 3],
        /// Per-channel offset.
        offset: [f32; 3],
        /// Per-channel power.
        power: [f32; 3],
        /// Saturation around Rec.709 luma.
        saturation: f32,
    },
    /// ACES filmic tone map.
    ToneMapAces {
        /// Linear exposure multiplier applied before the curve.
        exposure: f32,
    },
    /// 3D LUT sample (trilinear).
    Lut3d {
        /// Cube edge length.
        size: u8,
        /// `size^3` RGB entries, red fastest.
        data: Arc<Vec<[f32; 3]>>,
    },
    /// Scalar-to-RGB false color on working luma.
    FalseColor {
        /// Color map.
        map: FalseColorMap,
        /// Exposure shaping.
        exposure: f32,
        /// Gamma shaping.
        gamma: f32,
    },
    /// Premultiplied composite of `inputs[1]` over `inputs[0]`.
    Composite {
        /// Blend mode.
        blend: BlendMode,
    },
    /// Linear blend of two inputs at eased `progress`.
    Crossfade {
        /// Blend position in `[0,1]`.
        progress: f32,
    },
    /// Two-phase dip through a color.
    Dip {
        /// Dip color in working space.
        color: [f32; 3],
        /// Transition position in `[0,1]`.
        progress: f32,
    },
    /// Geometric wipe partition.
    Wipe {
        /// Travel direction.
        direction: WipeDirection,
        /// Transition position in `[0,1]`.
        progress: f32,
    },
    /// Source-time scaling marker; pixel passthrough.
    Retime {
        /// Applied rate factor (already folded into source times).
        factor: f32,
    },
    /// Overlay stripe/tag watermark.
    Watermark {
        /// Overlay parameters.
        spec: WatermarkSpec,
    },
}

impl NodeKind {
    /// Number of input edges this kind requires.
    pub fn arity(&self) -> usize {
        match self {
            NodeKind::SourceTexture { .. }
            | NodeKind::SourceProcedural { .. }
            | NodeKind::BlackFill => 0,
            NodeKind::Idt { .. }
            | NodeKind::Odt { .. }
            | NodeKind::ColorCdl { .. }
            | NodeKind::ToneMapAces { .. }
            | NodeKind::Lut3d { .. }
            | NodeKind::FalseColor { .. }
            | NodeKind::Retime { .. }
            | NodeKind::Watermark { .. } => 1,
            NodeKind::Composite { .. }
            | NodeKind::Crossfade { .. }
            | NodeKind::Dip { .. }
            | NodeKind::Wipe { .. } => 2,
        }
    }

    /// Stable catalog label, used by dumps and the kernel library.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::SourceTexture { .. } => "source_texture",
            NodeKind::SourceProcedural { .. } => "source_procedural",
            NodeKind::BlackFill => "black_fill",
            NodeKind::Idt { .. } => "idt",
            NodeKind::Odt { .. } => "odt",
            NodeKind::ColorCdl { .. } => "color_cdl",
            NodeKind::ToneMapAces { .. } => "tonemap_aces",
            NodeKind::Lut3d { .. } => "lut3d",
            NodeKind::FalseColor { .. } => "false_color",
            NodeKind::Composite { .. } => "composite",
            NodeKind::Crossfade { .. } => "crossfade",
            NodeKind::Dip { .. } => "dip",
            NodeKind::Wipe { .. } => "wipe",
            NodeKind::Retime { .. } => "retime",
            NodeKind::Watermark { .. } => "watermark",
        }
    }

    /// All catalog labels, in catalog order. The kernel library must cover
    /// every one of these.
    pub const LABELS: [&'static str; 15] = [
        "source_texture",
        "source_procedural",
        "black_fill",
        "idt",
        "odt",
        "color_cdl",
        "tonemap_aces",
        "lut3d",
        "false_color",
        "composite",
        "crossfade",
        "dip",
        "wipe",
        "retime",
        "watermark",
    ];
}

/// One node of a render graph.
#[derive(Clone, Debug)]
pub struct RenderNode {
    /// Diagnostic name (usually derived from the clip).
    pub name: String,
    /// Catalog kind and parameters.
    pub kind: NodeKind,
    /// Input edges, earliest first.
    pub inputs: SmallVec<[NodeId; 2]>,
}

/// A per-frame render DAG with a single `Odt` sink.
#[derive(Clone, Debug, Default)]
pub struct RenderGraph {
    nodes: Vec<RenderNode>,
}

impl RenderGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its id.
    pub fn add(&mut self, name: impl Into<String>, kind: NodeKind, inputs: &[NodeId]) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(RenderNode {
            name: name.into(),
            kind,
            inputs: SmallVec::from_slice(inputs),
        });
        id
    }

    /// Borrow the node list in insertion order.
    pub fn nodes(&self) -> &[RenderNode] {
        &self.nodes
    }

    /// Node count.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate the DAG and return a topological execution order.
    ///
    /// Checks: arity per kind, in-range edges, every leaf is a source, exactly
    /// one `Odt` which is the unique sink, no orphan intermediates, and
    /// acyclicity via a Kahn sort.
    pub fn validate(&self) -> MvResult<Vec<NodeId>> {
        if self.nodes.is_empty() {
            return Err(MetavisError::compile("render graph is empty"));
        }

        let n = self.nodes.len();
        let mut consumers = vec![0usize; n];
        for (i, node) in self.nodes.iter().enumerate() {
            let want = node.kind.arity();
            if node.inputs.len() != want {
                return Err(MetavisError::compile(format!(
                    "node '{}' ({}) has {} inputs, expected {want}",
                    node.name,
                    node.kind.label(),
                    node.inputs.len()
                )));
            }
            for input in &node.inputs {
                if input.0 as usize >= n {
                    return Err(MetavisError::compile(format!(
                        "node '{}' references missing node {}",
                        node.name, input.0
                    )));
                }
                if input.0 as usize == i {
                    return Err(MetavisError::compile(format!(
                        "node '{}' references itself",
                        node.name
                    )));
                }
                consumers[input.0 as usize] += 1;
            }
        }

        let mut sinks = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let is_odt = matches!(node.kind, NodeKind::Odt { .. });
            if consumers[i] == 0 {
                if !is_odt {
                    return Err(MetavisError::compile(format!(
                        "node '{}' ({}) has no consumers and is not the sink",
                        node.name,
                        node.kind.label()
                    )));
                }
                sinks.push(i);
            } else if is_odt {
                return Err(MetavisError::compile(format!(
                    "odt node '{}' must be the sink but has consumers",
                    node.name
                )));
            }
        }
        if sinks.len() != 1 {
            return Err(MetavisError::compile(format!(
                "graph must have exactly one odt sink, found {}",
                sinks.len()
            )));
        }

        // Kahn sort over input edges.
        let mut indegree: Vec<usize> = self.nodes.iter().map(|nd| nd.inputs.len()).collect();
        let mut dependents: Vec<Vec<u32>> = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                dependents[input.0 as usize].push(i as u32);
            }
        }
        let mut ready: Vec<u32> = (0..n as u32).filter(|&i| indegree[i as usize] == 0).collect();
        ready.sort_unstable();
        let mut order = Vec::with_capacity(n);
        let mut head = 0;
        while head < ready.len() {
            let i = ready[head];
            head += 1;
            order.push(NodeId(i));
            for &d in &dependents[i as usize] {
                indegree[d as usize] -= 1;
                if indegree[d as usize] == 0 {
                    ready.push(d);
                }
            }
        }
        if order.len() != n {
            return Err(MetavisError::compile(
                "render graph contains a cycle",
            ));
        }
        Ok(order)
    }

    /// Deterministic debug dump; never prints addresses or map orderings.
    pub fn dump(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("RenderGraph nodes: {}\n", self.nodes.len()));
        for (i, node) in self.nodes.iter().enumerate() {
            let inputs: Vec<u32> = node.inputs.iter().map(|n| n.0).collect();
            s.push_str(&format!(
                "  N{i}: {} '{}' inputs={inputs:?}\n",
                node.kind.label(),
                node.name
            ));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> NodeKind {
        NodeKind::SourceProcedural {
            spec: ProceduralSpec {
                kind: "video/smpte_bars".to_owned(),
                query: BTreeMap::new(),
            },
            asset_id: "bars".to_owned(),
            source: Tick::ZERO,
        }
    }

    fn minimal_graph() -> RenderGraph {
        let mut g = RenderGraph::new();
        let s = g.add("bars", source(), &[]);
        let idt = g.add(
            "bars.idt",
            NodeKind::Idt {
                from: ColorSpace::Rec709Display,
            },
            &[s],
        );
        g.add("sink", NodeKind::Odt { bit_depth: 8 }, &[idt]);
        g
    }

    #[test]
    fn minimal_graph_validates_in_topo_order() {
        let g = minimal_graph();
        let order = g.validate().unwrap();
        assert_eq!(order, vec![NodeId(0), NodeId(1), NodeId(2)]);
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let mut g = RenderGraph::new();
        let s = g.add("bars", source(), &[]);
        let s2 = g.add("bars2", source(), &[]);
        let x = g.add("fade", NodeKind::Crossfade { progress: 0.5 }, &[s]);
        g.add("sink", NodeKind::Odt { bit_depth: 8 }, &[x]);
        let err = g.validate().unwrap_err();
        assert!(err.to_string().contains("expected 2"), "{err}");
        let _ = s2;
    }

    #[test]
    fn missing_sink_is_rejected() {
        let mut g = RenderGraph::new();
        let s = g.add("bars", source(), &[]);
        g.add(
            "idt",
            NodeKind::Idt {
                from: ColorSpace::Rec709Display,
            },
            &[s],
        );
        let err = g.validate().unwrap_err();
        assert!(err.to_string().contains("not the sink"), "{err}");
    }

    #[test]
    fn two_sinks_are_rejected() {
        let mut g = RenderGraph::new();
        let s = g.add("bars", source(), &[]);
        g.add("sink1", NodeKind::Odt { bit_depth: 8 }, &[s]);
        let s2 = g.add("bars2", source(), &[]);
        g.add("sink2", NodeKind::Odt { bit_depth: 8 }, &[s2]);
        let err = g.validate().unwrap_err();
        assert!(err.to_string().contains("exactly one odt sink"), "{err}");
    }

    #[test]
    fn cycle_is_rejected() {
        let mut g = RenderGraph::new();
        let s = g.add("bars", source(), &[]);
        let a = g.add("fade", NodeKind::Crossfade { progress: 0.5 }, &[s, s]);
        let b = g.add("tm", NodeKind::ToneMapAces { exposure: 1.0 }, &[a]);
        g.add("sink", NodeKind::Odt { bit_depth: 8 }, &[b]);
        // Rewire the crossfade's second input forward to create a->b->a.
        g.nodes[a.0 as usize].inputs[1] = b;
        let err = g.validate().unwrap_err();
        assert!(err.to_string().contains("cycle"), "{err}");
    }

    #[test]
    fn dump_is_stable() {
        let g = minimal_graph();
        assert_eq!(g.dump(), g.dump());
        assert!(g.dump().contains("N2: odt"));
    }
}
