//! Native evaluation of XGBoost gradient boosted tree ensembles.
//!
//! Models are read from the JSON document XGBoost writes with
//! `Booster.save_model("model.json")`, so no XGBoost runtime is needed at
//! serving time.

use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;
use tracing::debug;

use crate::{ModelInput, ModelOutput, Predictor};

#[derive(Deserialize)]
struct XgbDocument {
    learner: XgbLearner,
}

#[derive(Deserialize)]
struct XgbLearner {
    gradient_booster: XgbGradientBooster,
    learner_model_param: XgbLearnerModelParam,
    objective: XgbObjective,
    #[serde(default)]
    feature_names: Vec<String>,
}

#[derive(Deserialize)]
struct XgbGradientBooster {
    name: String,
    #[serde(default)]
    model: Option<XgbGbtreeModel>,
}

#[derive(Deserialize)]
struct XgbGbtreeModel {
    trees: Vec<XgbTree>,
}

#[derive(Deserialize)]
struct XgbTree {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f32>,
    default_left: Vec<XgbFlag>,
}

/// Older writers store booleans as 0/1 integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum XgbFlag {
    Bool(bool),
    Int(i64),
}

impl XgbFlag {
    const fn is_set(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
        }
    }
}

#[derive(Deserialize)]
struct XgbLearnerModelParam {
    base_score: String,
    num_feature: String,
    #[serde(default)]
    num_target: Option<String>,
}

#[derive(Deserialize)]
struct XgbObjective {
    name: String,
}

/// Link between the summed tree margin and the reported prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Squared error and the other plain regression losses.
    Identity,
    /// Logistic regression and binary classification.
    Logistic,
    /// Poisson, gamma and tweedie regression.
    Exponential,
}

impl Objective {
    fn from_name(name: &str) -> Result<Self> {
        match name {
            "reg:squarederror" | "reg:squaredlogerror" | "reg:pseudohubererror"
            | "reg:absoluteerror" | "reg:quantileerror" | "reg:linear" => Ok(Self::Identity),
            "reg:logistic" | "binary:logistic" => Ok(Self::Logistic),
            "count:poisson" | "reg:gamma" | "reg:tweedie" => Ok(Self::Exponential),
            _ => bail!("Unsupported XGBoost objective: {name}"),
        }
    }

    /// Converts the stored base score into margin space.
    fn base_margin(self, base_score: f32) -> Result<f32> {
        match self {
            Self::Identity => Ok(base_score),
            Self::Logistic => {
                ensure!(
                    base_score > 0.0 && base_score < 1.0,
                    "Logistic base score must lie in (0, 1), got {base_score}"
                );
                Ok((base_score / (1.0 - base_score)).ln())
            }
            Self::Exponential => {
                ensure!(
                    base_score > 0.0,
                    "Exponential base score must be positive, got {base_score}"
                );
                Ok(base_score.ln())
            }
        }
    }

    /// Maps a margin to the prediction space.
    #[must_use]
    pub fn transform(self, margin: f32) -> f32 {
        match self {
            Self::Identity => margin,
            Self::Logistic => 1.0 / (1.0 + (-margin).exp()),
            Self::Exponential => margin.exp(),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f32),
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        default_left: bool,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_xgb(raw: XgbTree, num_feature: usize) -> Result<Self> {
        let len = raw.left_children.len();
        ensure!(len > 0, "Tree has no nodes");
        ensure!(
            raw.right_children.len() == len
                && raw.split_indices.len() == len
                && raw.split_conditions.len() == len
                && raw.default_left.len() == len,
            "Tree node arrays have inconsistent lengths"
        );

        let mut nodes = Vec::with_capacity(len);
        for index in 0..len {
            let left = raw.left_children[index];
            let right = raw.right_children[index];

            if left == -1 {
                ensure!(right == -1, "Node {index} has only one child");
                nodes.push(Node::Leaf(raw.split_conditions[index]));
                continue;
            }

            // Children are always stored after their parent, which also rules out cycles.
            let child = |c: i64| -> Result<usize> {
                usize::try_from(c)
                    .ok()
                    .filter(|&c| c > index && c < len)
                    .with_context(|| format!("Node {index} has invalid child {c}"))
            };

            let feature = usize::try_from(raw.split_indices[index])
                .ok()
                .filter(|&f| f < num_feature)
                .with_context(|| {
                    format!(
                        "Node {index} splits on feature {} but the model has {num_feature}",
                        raw.split_indices[index]
                    )
                })?;

            nodes.push(Node::Split {
                feature,
                threshold: raw.split_conditions[index],
                left: child(left)?,
                right: child(right)?,
                default_left: raw.default_left[index].is_set(),
            });
        }

        Ok(Self { nodes })
    }

    /// Walks the tree for `row`. Missing values (NaN) follow the default branch.
    fn leaf_value(&self, row: &[f32]) -> f32 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let value = row[*feature];
                    index = if value.is_nan() {
                        if *default_left { *left } else { *right }
                    } else if value < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// A fitted XGBoost regression ensemble.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    trees: Vec<Tree>,
    base_margin: f32,
    objective: Objective,
    num_feature: usize,
    feature_names: Vec<String>,
}

impl GradientBoostedTrees {
    /// Parses an XGBoost JSON model.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid single-target `gbtree`
    /// model with a supported objective.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let document: XgbDocument =
            serde_json::from_slice(bytes).context("Failed to parse XGBoost JSON model")?;
        let learner = document.learner;

        if learner.gradient_booster.name != "gbtree" {
            bail!(
                "Unsupported XGBoost booster: {}",
                learner.gradient_booster.name
            );
        }

        let params = learner.learner_model_param;
        let num_feature: usize = params
            .num_feature
            .trim()
            .parse()
            .context("Invalid num_feature in XGBoost model")?;
        ensure!(num_feature > 0, "XGBoost model declares no features");

        if let Some(num_target) = params.num_target.as_deref() {
            let num_target: usize = num_target
                .trim()
                .parse()
                .context("Invalid num_target in XGBoost model")?;
            ensure!(num_target <= 1, "Multi-target XGBoost models are not supported");
        }

        let objective = Objective::from_name(&learner.objective.name)?;
        let base_margin = objective.base_margin(parse_base_score(&params.base_score)?)?;

        let model = learner
            .gradient_booster
            .model
            .context("XGBoost model has no trees section")?;
        let trees = model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, tree)| {
                Tree::from_xgb(tree, num_feature).with_context(|| format!("Invalid tree {i}"))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            trees = trees.len(),
            num_feature,
            objective = ?objective,
            "Parsed XGBoost model"
        );

        Ok(Self {
            trees,
            base_margin,
            objective,
            num_feature,
            feature_names: learner.feature_names,
        })
    }

    #[must_use]
    pub const fn num_feature(&self) -> usize {
        self.num_feature
    }

    #[must_use]
    pub const fn num_trees(&self) -> usize {
        self.trees.len()
    }

    #[must_use]
    pub const fn objective(&self) -> Objective {
        self.objective
    }

    /// Feature names recorded at fit time; empty if none were recorded.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Predicts a single feature row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row length differs from the model's feature count.
    pub fn predict_row(&self, row: &[f32]) -> Result<f32> {
        ensure!(
            row.len() == self.num_feature,
            "Expected {} features, got {}",
            self.num_feature,
            row.len()
        );

        let margin = self
            .trees
            .iter()
            .fold(self.base_margin, |acc, tree| acc + tree.leaf_value(row));

        Ok(self.objective.transform(margin))
    }
}

impl Predictor for GradientBoostedTrees {
    fn family(&self) -> &'static str {
        "xgboost"
    }

    fn predict(&self, input: &ModelInput) -> Result<ModelOutput> {
        match input {
            ModelInput::Tabular(row) => Ok(ModelOutput::scalar(self.predict_row(row)?)),
            ModelInput::Image(_) => bail!("Tree ensembles only accept tabular input"),
        }
    }
}

/// Newer writers wrap the base score in brackets, e.g. `"[5E-1]"`.
fn parse_base_score(raw: &str) -> Result<f32> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .parse()
        .with_context(|| format!("Invalid base_score in XGBoost model: {raw}"))
}
