//! OpenCV cascade XML reader
//!
//! Two layouts are understood:
//! - current (`<cascade>` with `<stages>`, `<weakClassifiers>` and a shared
//!   `<features>` list, nodes packed as `left right featureIdx threshold`)
//! - legacy (`type_id="opencv-haar-classifier"`, `<size>`, `<trees>` with a
//!   `<feature>` inside every node)

use super::{Branch, CascadeModel, DecisionNode, HaarFeature, Stage, WeakClassifier, WeightedRect};
use crate::error::{malformed, Result};
use roxmltree::{Document, Node};
use std::str::FromStr;

const LEGACY_TYPE_ID: &str = "opencv-haar-classifier";

pub(super) fn parse(definition: &str) -> Result<CascadeModel> {
    let doc = Document::parse(definition).map_err(|e| malformed(format!("invalid XML: {}", e)))?;
    let root = doc.root_element();
    let cascade = if root.tag_name().name() == "opencv_storage" {
        elements(root)
            .next()
            .ok_or_else(|| malformed("opencv_storage holds no cascade"))?
    } else {
        root
    };

    if cascade.attribute("type_id") == Some(LEGACY_TYPE_ID) || opt_child(cascade, "size").is_some() {
        parse_legacy(cascade)
    } else {
        parse_current(cascade)
    }
}

fn parse_current(cascade: Node<'_, '_>) -> Result<CascadeModel> {
    if let Some(kind) = opt_child(cascade, "featureType") {
        let kind = text(kind);
        if !kind.eq_ignore_ascii_case("HAAR") {
            return Err(malformed(format!("unsupported feature type {}", kind)));
        }
    }
    if let Some(kind) = opt_child(cascade, "stageType") {
        let kind = text(kind);
        if !kind.eq_ignore_ascii_case("BOOST") {
            return Err(malformed(format!("unsupported stage type {}", kind)));
        }
    }

    let width: u32 = number(text(child(cascade, "width")?), "width")?;
    let height: u32 = number(text(child(cascade, "height")?), "height")?;

    let features = elements(child(cascade, "features")?)
        .enumerate()
        .map(|(i, f)| {
            let rects = child(f, "rects").map_err(|e| e.context(&format!("feature {}", i)))?;
            if let Some(tilted) = opt_child(f, "tilted") {
                reject_tilted(tilted, &format!("feature {}", i))?;
            }
            read_feature(rects).map_err(|e| e.context(&format!("feature {}", i)))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut stages = Vec::new();
    for (s, stage) in elements(child(cascade, "stages")?).enumerate() {
        let threshold: f32 = number(text(child(stage, "stageThreshold")?), "stageThreshold")?;
        let mut classifiers = Vec::new();
        for (c, weak) in elements(child(stage, "weakClassifiers")?).enumerate() {
            let at = || format!("stage {} classifier {}", s, c);
            let packed: Vec<f64> = numbers(text(child(weak, "internalNodes")?), "internalNodes")?;
            let leaves: Vec<f32> = numbers(text(child(weak, "leafValues")?), "leafValues")?;
            if packed.is_empty() || packed.len() % 4 != 0 {
                return Err(malformed(format!(
                    "{}: internalNodes must hold groups of 4 values, found {}",
                    at(),
                    packed.len()
                )));
            }
            let nodes = packed
                .chunks_exact(4)
                .map(|n| {
                    let feature_idx = index(n[2], "featureIdx").map_err(|e| e.context(&at()))?;
                    let feature = features.get(feature_idx).copied().ok_or_else(|| {
                        malformed(format!("{}: feature {} does not exist", at(), feature_idx))
                    })?;
                    Ok(DecisionNode {
                        feature,
                        threshold: n[3] as f32,
                        left: branch(n[0]).map_err(|e| e.context(&at()))?,
                        right: branch(n[1]).map_err(|e| e.context(&at()))?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            classifiers.push(WeakClassifier::tree(nodes, leaves));
        }
        stages.push(Stage::new(classifiers, threshold));
    }

    if let Some(declared) = opt_child(cascade, "stageNum") {
        let declared: usize = number(text(declared), "stageNum")?;
        if declared != stages.len() {
            return Err(malformed(format!(
                "stageNum is {} but {} stages are present",
                declared,
                stages.len()
            )));
        }
    }

    CascadeModel::new((width, height), stages)
}

fn parse_legacy(cascade: Node<'_, '_>) -> Result<CascadeModel> {
    let size: Vec<u32> = numbers(text(child(cascade, "size")?), "size")?;
    let (width, height) = match size[..] {
        [w, h] => (w, h),
        _ => return Err(malformed("size must hold width and height")),
    };

    let mut stages = Vec::new();
    for (s, stage) in elements(child(cascade, "stages")?).enumerate() {
        let threshold: f32 = number(text(child(stage, "stage_threshold")?), "stage_threshold")?;
        let mut classifiers = Vec::new();
        for (t, tree) in elements(child(stage, "trees")?).enumerate() {
            let at = format!("stage {} tree {}", s, t);
            let mut nodes = Vec::new();
            let mut leaves = Vec::new();
            for node in elements(tree) {
                let element = child(node, "feature")?;
                if let Some(tilted) = opt_child(element, "tilted") {
                    reject_tilted(tilted, &at)?;
                }
                let feature = read_feature(child(element, "rects")?)
                    .map_err(|e| e.context(&at))?;
                let threshold: f32 = number(text(child(node, "threshold")?), "threshold")?;
                let left = legacy_branch(node, "left", &mut leaves)?;
                let right = legacy_branch(node, "right", &mut leaves)?;
                nodes.push(DecisionNode {
                    feature,
                    threshold,
                    left,
                    right,
                });
            }
            classifiers.push(WeakClassifier::tree(nodes, leaves));
        }
        stages.push(Stage::new(classifiers, threshold));
    }

    CascadeModel::new((width, height), stages)
}

/// `<left_val>` emits a leaf, `<left_node>` continues at a node of the same tree
fn legacy_branch(node: Node<'_, '_>, side: &str, leaves: &mut Vec<f32>) -> Result<Branch> {
    let val = format!("{}_val", side);
    let next = format!("{}_node", side);
    if let Some(v) = opt_child(node, &val) {
        leaves.push(number(text(v), &val)?);
        return Ok(Branch::Leaf(leaves.len() - 1));
    }
    if let Some(n) = opt_child(node, &next) {
        return Ok(Branch::Node(number(text(n), &next)?));
    }
    Err(malformed(format!("node has neither {} nor {}", val, next)))
}

fn read_feature(rects: Node<'_, '_>) -> Result<HaarFeature> {
    let rects = elements(rects)
        .map(|r| {
            let fields: Vec<&str> = text(r).split_whitespace().collect();
            match fields[..] {
                [x, y, w, h, weight] => Ok(WeightedRect::new(
                    number(x, "rect x")?,
                    number(y, "rect y")?,
                    number(w, "rect width")?,
                    number(h, "rect height")?,
                    number(weight, "rect weight")?,
                )),
                _ => Err(malformed(format!("rect needs 5 values, found {}", fields.len()))),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    HaarFeature::from_rects(&rects)
}

fn reject_tilted(tilted: Node<'_, '_>, at: &str) -> Result<()> {
    let flag: i64 = number(text(tilted), "tilted")?;
    if flag != 0 {
        return Err(malformed(format!("{}: tilted features are not supported", at)));
    }
    Ok(())
}

/// Packed child reference: positive is a node index, zero or negative is leaf `-v`
fn branch(value: f64) -> Result<Branch> {
    if value.fract() != 0.0 || !value.is_finite() {
        return Err(malformed(format!("child reference {} is not an integer", value)));
    }
    if value > 0.0 {
        Ok(Branch::Node(value as usize))
    } else {
        Ok(Branch::Leaf((-value) as usize))
    }
}

fn index(value: f64, what: &str) -> Result<usize> {
    if value.fract() != 0.0 || !value.is_finite() || value < 0.0 {
        return Err(malformed(format!("{} {} is not a valid index", what, value)));
    }
    Ok(value as usize)
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn opt_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    elements(node).find(|n| n.tag_name().name() == name)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>> {
    opt_child(node, name).ok_or_else(|| {
        malformed(format!(
            "<{}> is missing <{}>",
            node.tag_name().name(),
            name
        ))
    })
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn number<T: FromStr>(s: &str, what: &str) -> Result<T> {
    s.trim()
        .parse()
        .map_err(|_| malformed(format!("cannot parse {} from {:?}", what, s)))
}

fn numbers<T: FromStr>(s: &str, what: &str) -> Result<Vec<T>> {
    s.split_whitespace().map(|t| number(t, what)).collect()
}
