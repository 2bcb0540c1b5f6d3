//! A [self-organizing map](https://en.wikipedia.org/wiki/Self-organizing_map)
//! laid out on a rectangular grid.

use itertools::izip;
use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Coordinates of a node on the map.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Squared Euclidean distance to `other` on the grid.
    pub fn distance_sq(&self, other: &Position) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        dx * dx + dy * dy
    }
}

/// A weight vector pinned at a fixed position.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    weights: Vec<f64>,
    position: Position,
}

impl Node {
    pub fn new(weights: Vec<f64>, position: Position) -> Self {
        Node { weights, position }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Squared Euclidean distance between `input` and the weights.
    pub fn distance_sq(&self, input: &[f64]) -> f64 {
        izip!(&self.weights, input)
            .map(|(w, x)| (x - w) * (x - w))
            .sum()
    }

    /// Pulls the weights towards `input` by `learning_rate * influence`.
    pub fn apply_weight_modifications(
        &mut self,
        input: &[f64],
        learning_rate: f64,
        influence: f64,
    ) {
        for (weight, x) in izip!(&mut self.weights, input) {
            *weight += learning_rate * influence * (x - *weight);
        }
    }
}

/// The nodes within a radius of a best-matching node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Neighbourhood {
    /// Node index and squared grid distance to the center.
    members: Vec<(usize, f64)>,
}

impl Neighbourhood {
    /// Collects every node of `nodes` within `radius` of `center`.
    pub fn around(nodes: &[Node], center: Position, radius: f64) -> Self {
        let limit = radius * radius;
        let members = nodes
            .iter()
            .enumerate()
            .map(|(id, node)| (id, node.position().distance_sq(&center)))
            .filter(|&(_, distance)| distance <= limit)
            .collect();
        Neighbourhood { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates over `(node index, squared grid distance)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.members.iter().cloned()
    }
}

/// A self-organizing map of `width x height` nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct KohonenMap {
    width: usize,
    height: usize,
    nodes: Vec<Node>,
}

impl KohonenMap {
    /// Creates a map whose nodes hold `dims` weights drawn uniformly from
    /// `[0, 1)`.
    pub fn new<R: Rng + ?Sized>(width: usize, height: usize, dims: usize, rng: &mut R) -> Self {
        let distribution = Uniform::new(0.0, 1.0);
        let nodes = (0..width * height)
            .map(|id| {
                let weights = (0..dims).map(|_| distribution.sample(rng)).collect();
                Node::new(weights, Position::new(id % width, id / width))
            })
            .collect();
        KohonenMap {
            width,
            height,
            nodes,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn best_match_id(&self, input: &[f64]) -> Option<usize> {
        self.nodes
            .iter()
            .map(|node| node.distance_sq(input))
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (id, distance)| match best {
                Some((_, closest)) if closest <= distance => best,
                _ => Some((id, distance)),
            })
            .map(|(id, _)| id)
    }

    /// The node whose weights are closest to `input`, the first one on ties.
    pub fn best_match(&self, input: &[f64]) -> Option<&Node> {
        self.best_match_id(input).map(|id| &self.nodes[id])
    }

    /// Trains the map for `iterations` steps, each on one input picked at
    /// random from `inputs`.
    ///
    /// The neighbourhood radius decays as `init_radius * exp(-t / c)` with
    /// `c = init_radius / ln(init_radius)`; a radius of 1 or less never
    /// shrinks. The learning rate decays as
    /// `learning_rate * exp(-t / iterations)`.
    ///
    /// Returns false if `inputs` is empty.
    pub fn calculate_weights<I, R>(
        &mut self,
        inputs: &[I],
        iterations: usize,
        learning_rate: f64,
        init_radius: f64,
        rng: &mut R,
    ) -> bool
    where
        I: AsRef<[f64]>,
        R: Rng + ?Sized,
    {
        if inputs.is_empty() || self.nodes.is_empty() {
            return !inputs.is_empty();
        }
        let time_constant = if init_radius > 1.0 {
            init_radius / init_radius.ln()
        } else {
            f64::INFINITY
        };
        debug!(
            nodes = self.nodes.len(),
            inputs = inputs.len(),
            iterations,
            "training kohonen map"
        );
        for t in 0..iterations {
            let input = match inputs.choose(rng) {
                Some(input) => input.as_ref(),
                None => return false,
            };
            let center = match self.best_match_id(input) {
                Some(id) => self.nodes[id].position(),
                None => return false,
            };
            let t = t as f64;
            let radius = init_radius * (-t / time_constant).exp();
            let rate = learning_rate * (-t / iterations as f64).exp();
            let neighbourhood = Neighbourhood::around(&self.nodes, center, radius);
            for (id, distance) in neighbourhood.iter() {
                let influence = if distance == 0.0 {
                    1.0
                } else {
                    (-distance / (2.0 * radius * radius)).exp()
                };
                self.nodes[id].apply_weight_modifications(input, rate, influence);
            }
        }
        true
    }
}
