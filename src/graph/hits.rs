//! HITS hub and authority scores.
//!
//! Authorities collect the hub scores of pages linking to them (`a = Aᵀh`),
//! hubs collect the authority scores of pages they link to (`h = A a`). Both
//! vectors are scaled by their maximum each round; iteration stops when the
//! hub vector moves less than `tol` in L1 or after `max_iter` rounds. The
//! returned vectors are scaled to sum to 1.

use std::collections::HashMap;

use super::LinkGraph;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitsScores {
    pub hubs: HashMap<String, f64>,
    pub authorities: HashMap<String, f64>,
}

fn scale_by_max(v: &mut [f64]) {
    let max = v.iter().cloned().fold(0.0f64, f64::max);
    if max > 0.0 {
        v.iter_mut().for_each(|x| *x /= max);
    }
}

fn scale_by_sum(v: &mut [f64]) {
    let sum: f64 = v.iter().sum();
    if sum > 0.0 {
        v.iter_mut().for_each(|x| *x /= sum);
    }
}

pub fn hits(graph: &LinkGraph, max_iter: usize, tol: f64) -> HitsScores {
    let n = graph.node_count();
    if n == 0 {
        return HitsScores::default();
    }

    let to_map = |values: &[f64]| -> HashMap<String, f64> {
        graph
            .nodes()
            .iter()
            .cloned()
            .zip(values.iter().copied())
            .collect()
    };

    // Without edges every score would collapse to zero; fall back to uniform.
    if graph.edge_count() == 0 {
        let uniform = vec![1.0 / n as f64; n];
        return HitsScores {
            hubs: to_map(&uniform),
            authorities: to_map(&uniform),
        };
    }

    let adjacency = graph.adjacency();
    let mut hub = vec![1.0 / n as f64; n];
    let mut authority = vec![0.0; n];

    for iteration in 0..max_iter {
        let previous = hub.clone();

        authority.iter_mut().for_each(|x| *x = 0.0);
        for (i, out) in adjacency.iter().enumerate() {
            for &j in out {
                authority[j] += previous[i];
            }
        }

        for (i, out) in adjacency.iter().enumerate() {
            hub[i] = out.iter().map(|&j| authority[j]).sum();
        }

        scale_by_max(&mut hub);
        scale_by_max(&mut authority);

        let delta: f64 = hub.iter().zip(&previous).map(|(a, b)| (a - b).abs()).sum();
        if delta < tol {
            tracing::trace!(iterations = iteration + 1, "hits converged");
            break;
        }
    }

    scale_by_sum(&mut hub);
    scale_by_sum(&mut authority);
    HitsScores {
        hubs: to_map(&hub),
        authorities: to_map(&authority),
    }
}
