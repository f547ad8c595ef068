//! PageRank by power iteration.
//!
//! Each round every node keeps the teleport share `(1 - d) / N`, receives
//! `d · rank / out_degree` from each in-neighbour, and receives an equal share
//! of the rank held by dangling nodes. Iteration stops once the L1 change is
//! below `N · tol` or after `max_iter` rounds; the result sums to 1.

use std::collections::HashMap;

use super::LinkGraph;

pub fn pagerank(
    graph: &LinkGraph,
    damping: f64,
    max_iter: usize,
    tol: f64,
) -> HashMap<String, f64> {
    let n = graph.node_count();
    if n == 0 {
        return HashMap::new();
    }

    let adjacency = graph.adjacency();
    let nf = n as f64;
    let mut rank = vec![1.0 / nf; n];
    let mut next = vec![0.0; n];

    for iteration in 0..max_iter {
        let dangling: f64 = adjacency
            .iter()
            .zip(&rank)
            .filter(|(out, _)| out.is_empty())
            .map(|(_, r)| r)
            .sum();
        let base = (1.0 - damping) / nf + damping * dangling / nf;
        next.iter_mut().for_each(|x| *x = base);

        for (i, out) in adjacency.iter().enumerate() {
            if out.is_empty() {
                continue;
            }
            let share = damping * rank[i] / out.len() as f64;
            for &j in out {
                next[j] += share;
            }
        }

        let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        std::mem::swap(&mut rank, &mut next);
        if delta < nf * tol {
            tracing::trace!(iterations = iteration + 1, "pagerank converged");
            break;
        }
    }

    // Guard against drift so the output sums to exactly 1.
    let total: f64 = rank.iter().sum();
    graph
        .nodes()
        .iter()
        .zip(rank)
        .map(|(url, r)| (url.clone(), r / total))
        .collect()
}
