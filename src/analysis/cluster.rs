//! Average-linkage hierarchical clustering for heatmap ordering

use kodama::{linkage, Method};
use ndarray::ArrayView2;

/// Whether rows or columns are the observations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterAxis {
    Rows,
    Columns,
}

/// Condensed pairwise Euclidean distances (upper triangle, row-major)
pub fn euclidean_distances(data: ArrayView2<f64>, axis: ClusterAxis) -> Vec<f64> {
    let n = match axis {
        ClusterAxis::Rows => data.nrows(),
        ClusterAxis::Columns => data.ncols(),
    };
    let get = |i: usize| match axis {
        ClusterAxis::Rows => data.row(i),
        ClusterAxis::Columns => data.column(i),
    };
    let mut condensed = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        let xi = get(i);
        for j in (i + 1)..n {
            let xj = get(j);
            let d: f64 = xi.iter().zip(xj.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
            condensed.push(d.sqrt());
        }
    }
    condensed
}

/// Leaf order of an average-linkage dendrogram over rows or columns.
///
/// The lower-numbered cluster of each merge goes left. Fewer than two
/// observations are returned in their original order.
pub fn cluster_order(data: ArrayView2<f64>, axis: ClusterAxis) -> Vec<usize> {
    let n = match axis {
        ClusterAxis::Rows => data.nrows(),
        ClusterAxis::Columns => data.ncols(),
    };
    if n < 2 {
        return (0..n).collect();
    }
    let mut condensed = euclidean_distances(data, axis);
    let dendrogram = linkage(&mut condensed, n, Method::Average);

    // cluster id n + i is step i
    let steps = dendrogram.steps();
    let mut order = Vec::with_capacity(n);
    let mut stack = vec![n + steps.len() - 1];
    while let Some(node) = stack.pop() {
        if node < n {
            order.push(node);
        } else {
            let step = &steps[node - n];
            let (left, right) = if step.cluster1 < step.cluster2 {
                (step.cluster1, step.cluster2)
            } else {
                (step.cluster2, step.cluster1)
            };
            stack.push(right);
            stack.push(left);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_distances() {
        let x = array![[0.0, 0.0], [3.0, 4.0], [0.0, 1.0]];
        let d = euclidean_distances(x.view(), ClusterAxis::Rows);
        assert_eq!(d, vec![5.0, 1.0, 18.0_f64.sqrt()]);
        assert_eq!(euclidean_distances(x.view(), ClusterAxis::Columns).len(), 1);
    }

    #[test]
    fn test_close_rows_are_adjacent() {
        let x = array![[0.0, 0.0], [10.0, 10.0], [0.1, 0.0], [10.0, 10.2], [0.0, 0.2]];
        let order = cluster_order(x.view(), ClusterAxis::Rows);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
        let pos = |r: usize| order.iter().position(|&o| o == r).unwrap();
        let low = [pos(0), pos(2), pos(4)];
        let high = [pos(1), pos(3)];
        assert!(low.iter().all(|&a| high.iter().all(|&b| a < b)) || low.iter().all(|&a| high.iter().all(|&b| a > b)));
    }

    #[test]
    fn test_single_observation() {
        let x = array![[1.0, 2.0]];
        assert_eq!(cluster_order(x.view(), ClusterAxis::Rows), vec![0]);
        assert_eq!(cluster_order(x.view(), ClusterAxis::Columns).len(), 2);
    }
}
