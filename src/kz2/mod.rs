//! # Kolmogorov-Zabih disparity computation
//!
//! This module provides an implementation of the KZ2 algorithm from
//! ("Computing Visual Correspondence with Occlusions using Graph Cuts")[https://doi.org/10.1109/ICCV.2001.937668].
//!
//! The unknowns are assignments, pairs of a left pixel `p` and a right pixel `p + d` on the same
//! row. An assignment is either active or not, each pixel takes part in at most one active
//! assignment, and pixels with none are occluded. The energy sums, over active assignments, the
//! data cost minus the occlusion cost `K`, plus a smoothness penalty for each pair of neighbouring
//! assignments exactly one of which is active.
//!
//! The energy is minimized by alpha-expansion: for each disparity `alpha` in turn, a binary
//! problem decides which current assignments are kept and which assignments of disparity `alpha`
//! are activated. Each such problem is solved exactly by a min-cut.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

mod params;
mod penalty;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GenericImageView;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{debug, info, trace};

use crate::disparity::{DisparityAlgorithm, DisparityMap, OCCLUDED};
use crate::energy::{Energy, TotalValue, Value, Var};
use crate::error::*;
use crate::frame::StereoFrame;
use penalty::{data_penalty, max_gradient, Coord, IntervalImage};

pub use params::{DataCost, Params, Weights};

#[cfg(feature = "statistics")]
use plotters::prelude::*;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Half of the 4-neighbourhood, so that each pair of neighbours is visited once.
const NEIGHBOURS: [(i32, i32); 2] = [(-1, 0), (0, 1)];

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// The KZ2 disparity algorithm.
pub struct Kz2 {
    params: Params,
    convergence: Option<Convergence>
}

/// Solver state for one stereo frame.
pub struct Matcher {
    left: IntervalImage,
    right: IntervalImage,
    /// Height of the left image before cropping to the rows shared with the right image.
    left_height: usize,
    min_disparity: i32,
    max_disparity: i32,
    /// If `p + d_left[p]` is active, `d_right[p + d_left[p]] == -d_left[p]`.
    d_left: Vec<i32>,
    d_right: Vec<i32>,
    weights: Option<Weights>,
    energy: TotalValue
}

/// Outcome of a run of the algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct Convergence {
    pub energy: TotalValue,
    /// Number of passes over the disparity range started.
    pub iterations: u32,
    pub accepted_moves: u32,
    /// Every disparity was tried without success since the last accepted move, rather than the
    /// iteration budget running out.
    pub converged: bool,
    /// Energy before the first move, then after each accepted move.
    pub history: Vec<TotalValue>
}

/// Role of an assignment in an expansion move.
#[derive(Clone, Copy, Debug)]
enum Slot {
    /// Not part of the move, either occluded or out of the right image.
    Absent,
    /// Already at disparity alpha, active whatever the move does.
    Alpha,
    Var(Var)
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Kz2 {
    /// Create a new instance of the algorithm with the given parameters.
    pub fn new(params: Params) -> Self {
        Self {
            params,
            convergence: None
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Convergence of the last computed frame.
    pub fn convergence(&self) -> Option<&Convergence> {
        self.convergence.as_ref()
    }
}

impl DisparityAlgorithm for Kz2 {
    /// Compute the disparity map for the given frame.
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap> {
        let mut matcher = Matcher::new(frame, self.params.color)?;
        matcher.set_disparity_range(self.params.min_disparity, self.params.max_disparity)?;

        let weights = matcher.resolve_weights(&self.params)?;
        matcher.set_weights(weights)?;

        let convergence = matcher.run()?;

        // ---- PLOTTING ----
        #[cfg(feature = "statistics")]
        {
            if let Err(e) = plot_energy(&convergence.history) {
                tracing::warn!("Could not plot energy history: {}", e);
            }
        }

        self.convergence = Some(convergence);

        Ok(matcher.disparity_map())
    }
}

impl Matcher {
    /// Prepare the frame for matching, on gray levels or on RGB.
    ///
    /// Both images are cropped to the rows they share. Every pixel starts occluded, with an empty
    /// disparity range.
    pub fn new(frame: &StereoFrame, color: bool) -> Result<Self> {
        let height = frame.height();

        let (left, right) = if color {
            (
                IntervalImage::new(&frame.left.to_rgb(), height),
                IntervalImage::new(&frame.right.to_rgb(), height)
            )
        }
        else {
            (
                IntervalImage::new(&frame.left.to_luma(), height),
                IntervalImage::new(&frame.right.to_luma(), height)
            )
        };

        if left.width() == 0 || right.width() == 0 || height == 0 {
            return Err(Error::EmptyImage);
        }

        let d_left = vec![OCCLUDED; (left.width() * left.height()) as usize];
        let d_right = vec![OCCLUDED; (right.width() * right.height()) as usize];

        Ok(Self {
            left,
            right,
            left_height: frame.left.height() as usize,
            min_disparity: 0,
            max_disparity: 0,
            d_left,
            d_right,
            weights: None,
            energy: 0
        })
    }

    /// Set the range of disparities searched, occluding every pixel.
    ///
    /// The range must not be empty, its size and both bounds negated must fit in an `i32`, and it
    /// must not reach [`OCCLUDED`].
    pub fn set_disparity_range(&mut self, min: i32, max: i32) -> Result<()> {
        let span = max.checked_sub(min).and_then(|s| s.checked_add(1));
        if min > max || min == i32::MIN || max == OCCLUDED || span.is_none() {
            return Err(Error::InvalidDisparityRange { min, max });
        }

        self.min_disparity = min;
        self.max_disparity = max;
        self.d_left.iter_mut().for_each(|d| *d = OCCLUDED);
        self.d_right.iter_mut().for_each(|d| *d = OCCLUDED);
        self.energy = 0;

        Ok(())
    }

    /// Estimate the occlusion cost `K` from the data costs of the images.
    ///
    /// For each left pixel whose whole disparity range falls inside the right image, take the
    /// k-th smallest data cost over the range, k being a quarter of the number of disparities
    /// (at least 3). `K` is the average over these pixels.
    pub fn estimate_occlusion_cost(&self, data_cost: DataCost) -> Result<f32> {
        let labels = (self.max_disparity - self.min_disparity + 1) as usize;
        let k = ((labels + 2) / 4).max(3).min(labels);

        let xmin = (-self.min_disparity).max(0);
        let xmax = self.left.width().min(self.right.width().saturating_sub(self.max_disparity));

        let mut sum: i64 = 0;
        let mut num: i64 = 0;
        let mut costs = Vec::with_capacity(labels);

        for y in 0..self.left.height() {
            for x in xmin..xmax {
                let p = Coord::new(x, y);

                costs.clear();
                costs.extend(
                    (self.min_disparity..=self.max_disparity)
                        .map(|d| data_penalty(&self.left, &self.right, p, p.shift(d), data_cost))
                );
                costs.sort_unstable();

                sum += i64::from(costs[k - 1]);
                num += 1;
            }
        }

        if num == 0 {
            return Err(Error::NotEnoughSamples);
        }
        if sum == 0 {
            return Err(Error::ZeroNoiseEstimate);
        }

        let estimate = sum as f32 / num as f32;
        info!("Computing statistics: K (data penalty noise) = {}", estimate);

        Ok(estimate)
    }

    /// Resolve `params` into weights, estimating the occlusion cost if it is not given.
    pub fn resolve_weights(&self, params: &Params) -> Result<Weights> {
        let k = match params.occlusion_cost {
            Some(k) => k,
            None => self.estimate_occlusion_cost(params.data_cost)?
        };

        Weights::from_params(params, k)
    }

    pub fn set_weights(&mut self, weights: Weights) -> Result<()> {
        weights.validate()?;
        self.weights = Some(weights);
        Ok(())
    }

    pub fn weights(&self) -> Option<&Weights> {
        self.weights.as_ref()
    }

    /// Energy of the current disparity field, as of the last move.
    pub fn energy(&self) -> TotalValue {
        self.energy
    }

    /// Compute the energy of the current disparity field from scratch.
    pub fn compute_energy(&self) -> Result<TotalValue> {
        let weights = self.weights.as_ref().ok_or(Error::WeightsNotSet)?;
        Ok(self.energy_with(weights))
    }

    /// Run alpha-expansion until no disparity lowers the energy or the iteration budget is
    /// exhausted.
    pub fn run(&mut self) -> Result<Convergence> {
        let weights = self.weights.clone().ok_or(Error::WeightsNotSet)?;

        info!(
            "KZ2: disparities {}..={}, K = {}, lambda1 = {}, lambda2 = {}, denominator = {}",
            self.min_disparity,
            self.max_disparity,
            weights.occlusion_cost,
            weights.lambda1,
            weights.lambda2,
            weights.denominator
        );

        self.energy = self.energy_with(&weights);
        info!("Initial energy {}", self.energy);

        let mut order: Vec<i32> = (self.min_disparity..=self.max_disparity).collect();
        let labels = order.len();
        let mut rng = StdRng::seed_from_u64(weights.seed);

        let mut convergence = Convergence {
            energy: self.energy,
            iterations: 0,
            accepted_moves: 0,
            converged: false,
            history: vec![self.energy]
        };

        // labels tried since the last accepted move, indexed by `alpha - min_disparity`
        let mut done = vec![false; labels];
        let mut remaining = labels;

        for iteration in 0..weights.max_iterations {
            if remaining == 0 {
                break;
            }
            if iteration == 0 || weights.randomize {
                order.shuffle(&mut rng);
            }
            convergence.iterations += 1;

            for &alpha in &order {
                let label = (alpha - self.min_disparity) as usize;
                if done[label] {
                    continue;
                }

                if self.expansion_move(alpha, &weights) {
                    done.iter_mut().for_each(|d| *d = false);
                    remaining = labels;
                    convergence.accepted_moves += 1;
                    convergence.history.push(self.energy);
                    debug!("Expansion to {} accepted, energy {}", alpha, self.energy);
                }

                done[label] = true;
                remaining -= 1;
            }

            info!("Iteration {} done, energy {}", iteration + 1, self.energy);
        }

        convergence.converged = remaining == 0;

        convergence.energy = self.energy;
        Ok(convergence)
    }

    /// The disparity of each left pixel, rows missing from the right image are occluded.
    pub fn disparity_map(&self) -> DisparityMap {
        let width = self.left.width() as usize;
        let mut map = DisparityMap::new(width, self.left_height);

        for (i, &d) in self.d_left.iter().enumerate() {
            map.put(i % width, i / width, d);
        }
        map.min_disp = Some(self.min_disparity);
        map.max_disp = Some(self.max_disparity);

        map
    }

    /// The disparity of each right pixel, pointing back into the left image.
    pub fn right_disparity_map(&self) -> DisparityMap {
        let width = self.right.width() as usize;
        let mut map = DisparityMap::new(width, self.right.height() as usize);

        for (i, &d) in self.d_right.iter().enumerate() {
            map.put(i % width, i / width, d);
        }
        map.min_disp = Some(-self.max_disparity);
        map.max_disp = Some(-self.min_disparity);

        map
    }

    // ---- PENALTIES ----

    fn left_index(&self, p: Coord) -> usize {
        (p.y * self.left.width() + p.x) as usize
    }

    fn right_index(&self, q: Coord) -> usize {
        (q.y * self.right.width() + q.x) as usize
    }

    fn pixels(&self) -> impl Iterator<Item = Coord> {
        let (width, height) = (self.left.width(), self.left.height());
        (0..height).flat_map(move |y| (0..width).map(move |x| Coord::new(x, y)))
    }

    /// Data cost of assignment `(p, q)` relative to leaving both pixels occluded.
    fn data_occlusion_penalty(&self, p: Coord, q: Coord, weights: &Weights) -> Value {
        let d = data_penalty(&self.left, &self.right, p, q, weights.data_cost);
        weights.denominator * d - weights.occlusion_cost
    }

    /// Penalty for neighbouring assignments `(p1, p1 + d)` and `(p2, p2 + d)` to differ in
    /// activity.
    fn smoothness_penalty(&self, p1: Coord, p2: Coord, d: i32, weights: &Weights) -> Value {
        if max_gradient(&self.left, &self.right, p1, p2, d) < weights.edge_threshold {
            weights.lambda1
        }
        else {
            weights.lambda2
        }
    }

    fn energy_with(&self, weights: &Weights) -> TotalValue {
        let mut energy: TotalValue = 0;

        for p in self.pixels() {
            let d1 = self.d_left[self.left_index(p)];
            if d1 != OCCLUDED {
                energy += TotalValue::from(self.data_occlusion_penalty(p, p.shift(d1), weights));
            }

            for &(dx, dy) in NEIGHBOURS.iter() {
                let p2 = Coord::new(p.x + dx, p.y + dy);
                if !self.left.contains(p2) {
                    continue;
                }

                let d2 = self.d_left[self.left_index(p2)];
                if d1 == d2 {
                    continue;
                }
                if d1 != OCCLUDED && self.right.contains(p2.shift(d1)) {
                    energy += TotalValue::from(self.smoothness_penalty(p, p2, d1, weights));
                }
                if d2 != OCCLUDED && self.right.contains(p.shift(d2)) {
                    energy += TotalValue::from(self.smoothness_penalty(p, p2, d2, weights));
                }
            }
        }

        energy
    }

    // ---- EXPANSION MOVE ----

    /// Try expanding disparity `alpha`, keeping the result only if it lowers the energy.
    fn expansion_move(&mut self, alpha: i32, weights: &Weights) -> bool {
        let n = self.d_left.len();
        let mut e = Energy::with_capacity(2 * n, 12 * n);

        // current assignment and alpha assignment of each left pixel
        let mut old = vec![Slot::Absent; n];
        let mut new = vec![Slot::Absent; n];

        for p in self.pixels() {
            self.build_nodes(&mut e, &mut old, &mut new, p, alpha, weights);
        }

        for p in self.pixels() {
            for &(dx, dy) in NEIGHBOURS.iter() {
                let p2 = Coord::new(p.x + dx, p.y + dy);
                if self.left.contains(p2) {
                    self.build_smoothness(&mut e, &old, &new, p, p2, alpha, weights);
                }
            }
        }

        for p in self.pixels() {
            self.build_uniqueness(&mut e, &old, &new, p, alpha);
        }

        let energy = e.minimize();
        trace!("Expansion to {}: {} variables, energy {}", alpha, e.variable_count(), energy);

        if energy < self.energy {
            self.update_disparity(&e, &old, &new, alpha);
            self.energy = energy;
            true
        }
        else {
            false
        }
    }

    fn build_nodes(
        &self,
        e: &mut Energy,
        old: &mut [Slot],
        new: &mut [Slot],
        p: Coord,
        alpha: i32,
        weights: &Weights
    ) {
        let i = self.left_index(p);
        let d = self.d_left[i];

        if d == alpha {
            old[i] = Slot::Alpha;
            new[i] = Slot::Alpha;
            e.add_constant(self.data_occlusion_penalty(p, p.shift(alpha), weights));
            return;
        }

        // 0 keeps the current assignment active
        if d != OCCLUDED {
            let cost = self.data_occlusion_penalty(p, p.shift(d), weights);
            old[i] = Slot::Var(e.add_variable(cost, 0));
        }

        // 1 activates the alpha assignment
        let q = p.shift(alpha);
        if self.right.contains(q) {
            let cost = self.data_occlusion_penalty(p, q, weights);
            new[i] = Slot::Var(e.add_variable(0, cost));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_smoothness(
        &self,
        e: &mut Energy,
        old: &[Slot],
        new: &[Slot],
        p1: Coord,
        p2: Coord,
        alpha: i32,
        weights: &Weights
    ) {
        let (i1, i2) = (self.left_index(p1), self.left_index(p2));
        let (d1, d2) = (self.d_left[i1], self.d_left[i2]);

        // assignments at disparity alpha
        match (new[i1], new[i2]) {
            (Slot::Var(a1), Slot::Var(a2)) => {
                let delta = self.smoothness_penalty(p1, p2, alpha, weights);
                e.add_pairwise_term(a1, a2, 0, delta, delta, 0);
            }
            (Slot::Var(a), Slot::Alpha) | (Slot::Alpha, Slot::Var(a)) => {
                let delta = self.smoothness_penalty(p1, p2, alpha, weights);
                e.add_unary_term(a, delta, 0);
            }
            _ => {}
        }

        // current assignments at the same disparity
        if d1 == d2 {
            if let (Slot::Var(o1), Slot::Var(o2)) = (old[i1], old[i2]) {
                let delta = self.smoothness_penalty(p1, p2, d1, weights);
                e.add_pairwise_term(o1, o2, 0, delta, delta, 0);
            }
            return;
        }

        // current assignments whose neighbour at the same disparity stays inactive
        if let Slot::Var(o1) = old[i1] {
            if self.right.contains(p2.shift(d1)) {
                e.add_unary_term(o1, self.smoothness_penalty(p1, p2, d1, weights), 0);
            }
        }
        if let Slot::Var(o2) = old[i2] {
            if self.right.contains(p1.shift(d2)) {
                e.add_unary_term(o2, self.smoothness_penalty(p1, p2, d2, weights), 0);
            }
        }
    }

    /// Forbid two active assignments sharing a pixel.
    ///
    /// The current assignment of `p` conflicts with the alpha assignment of `p`, and with the
    /// alpha assignment of the left pixel matching the same right pixel.
    fn build_uniqueness(&self, e: &mut Energy, old: &[Slot], new: &[Slot], p: Coord, alpha: i32) {
        let i = self.left_index(p);
        let o = match old[i] {
            Slot::Var(o) => o,
            _ => return
        };

        if let Slot::Var(a) = new[i] {
            e.forbid_assignment_01(o, a);
        }

        let rival = p.shift(self.d_left[i] - alpha);
        if self.left.contains(rival) {
            if let Slot::Var(a) = new[self.left_index(rival)] {
                e.forbid_assignment_01(o, a);
            }
        }
    }

    fn update_disparity(&mut self, e: &Energy, old: &[Slot], new: &[Slot], alpha: i32) {
        for p in self.pixels() {
            let i = self.left_index(p);
            if let Slot::Var(o) = old[i] {
                if e.value(o) {
                    let j = self.right_index(p.shift(self.d_left[i]));
                    self.d_right[j] = OCCLUDED;
                    self.d_left[i] = OCCLUDED;
                }
            }
        }

        for p in self.pixels() {
            let i = self.left_index(p);
            if let Slot::Var(a) = new[i] {
                if e.value(a) {
                    let j = self.right_index(p.shift(alpha));
                    self.d_left[i] = alpha;
                    self.d_right[j] = -alpha;
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------------------------
// STATISTICS
// -----------------------------------------------------------------------------------------------

#[cfg(feature = "statistics")]
fn plot_energy(history: &[TotalValue]) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let min = history.iter().copied().min().unwrap_or(0);
    let max = history.iter().copied().max().unwrap_or(0);

    let energy_plot = BitMapBackend::new(
        "plots/kz2/energy.png",
        (800, 600)
    ).into_drawing_area();
    energy_plot.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&energy_plot)
        .caption("Energy after each accepted move", ("sans-serif", 20).into_font())
        .margin(5)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_ranged(0..history.len(), min..(max + 1))?;

    chart.configure_mesh().draw()?;

    chart.draw_series(LineSeries::new(
        history.iter().enumerate().map(|(i, &e)| (i, e)),
        &RED
    ))?;

    info!("Energy plot saved");

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
