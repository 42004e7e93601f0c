//! Boosted Haar cascade loaded from OpenCV's XML cascade format.
//!
//! Only stump-based HAAR cascades in the current layout are supported (the
//! one the stock `haarcascade_frontalface_*.xml` files use): a fixed
//! detection window, a shared feature table, then stages of weak classifiers
//! that each test one feature against a threshold. Feature indices are
//! resolved at load time, so every weak classifier owns its rectangles.

use std::path::Path;

use roxmltree::{Document, Node};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse cascade XML: {0}")]
    Parse(#[from] roxmltree::Error),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
    #[error("invalid cascade: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub weight: f64,
}

/// Decision stump over one rectangle feature.
#[derive(Debug, Clone, PartialEq)]
pub struct WeakClassifier {
    pub rects: Vec<FeatureRect>,
    pub threshold: f64,
    /// Vote when the normalized feature value is below `threshold`.
    pub left: f64,
    pub right: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub threshold: f64,
    pub classifiers: Vec<WeakClassifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
}

impl HaarCascade {
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let xml = std::fs::read_to_string(path).map_err(|source| CascadeError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_xml(&xml)
    }

    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = Document::parse(xml)?;
        let cascade = doc
            .root_element()
            .children()
            .find(|n| n.is_element() && child(*n, "stages").is_some())
            .ok_or_else(|| {
                CascadeError::Unsupported("no <stages> element (old-style cascades are not supported)".into())
            })?;

        if let Some(kind) = child(cascade, "stageType") {
            if text(kind).trim() != "BOOST" {
                return Err(CascadeError::Unsupported(format!("stage type {}", text(kind).trim())));
            }
        }
        if let Some(kind) = child(cascade, "featureType") {
            if text(kind).trim() != "HAAR" {
                return Err(CascadeError::Unsupported(format!("feature type {}", text(kind).trim())));
            }
        }

        let window_width = parse_number(required(cascade, "width")?)?;
        let window_height = parse_number(required(cascade, "height")?)?;
        let features = required(cascade, "features")?
            .children()
            .filter(Node::is_element)
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?;
        let stages = required(cascade, "stages")?
            .children()
            .filter(Node::is_element)
            .enumerate()
            .map(|(s, node)| parse_stage(s, node, &features))
            .collect::<Result<Vec<_>, _>>()?;

        let cascade = Self {
            window_width,
            window_height,
            stages,
        };
        cascade.validate()?;
        Ok(cascade)
    }

    pub fn weak_classifier_count(&self) -> usize {
        self.stages.iter().map(|s| s.classifiers.len()).sum()
    }

    /// Rejects cascades whose features would read outside the window.
    pub fn validate(&self) -> Result<(), CascadeError> {
        // The variance window is inset by one pixel on every side
        if self.window_width < 3 || self.window_height < 3 {
            return Err(CascadeError::Invalid(format!(
                "window {}x{} is too small",
                self.window_width, self.window_height
            )));
        }
        if self.stages.is_empty() {
            return Err(CascadeError::Invalid("no stages".into()));
        }
        for (s, stage) in self.stages.iter().enumerate() {
            if stage.classifiers.is_empty() {
                return Err(CascadeError::Invalid(format!("stage {s} has no classifiers")));
            }
            for rect in stage.classifiers.iter().flat_map(|c| &c.rects) {
                if rect.w == 0
                    || rect.h == 0
                    || rect.x + rect.w > self.window_width
                    || rect.y + rect.h > self.window_height
                {
                    return Err(CascadeError::Invalid(format!(
                        "stage {s} feature rect {rect:?} leaves the {}x{} window",
                        self.window_width, self.window_height
                    )));
                }
            }
        }
        Ok(())
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn required<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, CascadeError> {
    child(node, name).ok_or_else(|| CascadeError::Invalid(format!("missing <{name}>")))
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("")
}

fn parse_number<T: std::str::FromStr>(node: Node) -> Result<T, CascadeError> {
    let raw = text(node).trim();
    raw.parse()
        .map_err(|_| CascadeError::Invalid(format!("<{}> is not a number: {raw:?}", node.tag_name().name())))
}

fn numbers(node: Node) -> Result<Vec<f64>, CascadeError> {
    text(node)
        .split_whitespace()
        .map(|v| {
            v.parse()
                .map_err(|_| CascadeError::Invalid(format!("<{}> has a bad value {v:?}", node.tag_name().name())))
        })
        .collect()
}

/// `<_><rects><_>x y w h weight</_>...</rects><tilted>0</tilted></_>`
fn parse_feature(node: Node) -> Result<Vec<FeatureRect>, CascadeError> {
    if let Some(tilted) = child(node, "tilted") {
        if text(tilted).trim() != "0" {
            return Err(CascadeError::Unsupported("tilted Haar features".into()));
        }
    }
    required(node, "rects")?
        .children()
        .filter(Node::is_element)
        .map(|r| match numbers(r)?.as_slice() {
            &[x, y, w, h, weight] if x >= 0.0 && y >= 0.0 && w >= 0.0 && h >= 0.0 => Ok(FeatureRect {
                x: x as u32,
                y: y as u32,
                w: w as u32,
                h: h as u32,
                weight,
            }),
            other => Err(CascadeError::Invalid(format!("bad feature rect {other:?}"))),
        })
        .collect()
}

/// `<internalNodes>left right feature threshold</internalNodes>` plus
/// `<leafValues>below above</leafValues>`; deeper trees are rejected.
fn parse_stage(index: usize, node: Node, features: &[Vec<FeatureRect>]) -> Result<Stage, CascadeError> {
    let threshold = parse_number(required(node, "stageThreshold")?)?;
    let classifiers = required(node, "weakClassifiers")?
        .children()
        .filter(Node::is_element)
        .map(|weak| {
            let internal = numbers(required(weak, "internalNodes")?)?;
            let leaves = numbers(required(weak, "leafValues")?)?;
            let (&[_, _, feature, threshold], &[left, right]) = (internal.as_slice(), leaves.as_slice()) else {
                return Err(CascadeError::Unsupported(format!(
                    "stage {index}: only single-split stumps are supported"
                )));
            };
            let rects = features
                .get(feature as usize)
                .filter(|_| feature >= 0.0)
                .ok_or_else(|| CascadeError::Invalid(format!("stage {index}: feature {feature} out of range")))?;
            Ok(WeakClassifier {
                rects: rects.clone(),
                threshold,
                left,
                right,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}
