use crate::graph::Graph;

/// Outcome of one pairing pass, indexed like the ranked units.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pairing {
    /// Id of the unit each unit is merged into (its own id when unpaired).
    pub labels: Vec<i64>,
    pub paired: Vec<bool>,
}

impl Pairing {
    /// Number of units that found a partner.
    #[inline] pub(crate) fn paired_count(&self) -> usize { self.paired.iter().filter(|&&p| p).count() }
}

/// Density gap between two units; missing densities sort after every known gap.
#[inline]
fn gap(a: Option<f64>, b: Option<f64>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs(),
        _ => f64::INFINITY,
    }
}

/// Pair neighbouring units of similar density.
///
/// Nodes of `graph` are the units in rank order (densest first). Each unpaired unit,
/// in that order, takes the unpaired neighbour with the closest density, breaking ties
/// by the longer shared boundary and then the smaller id. The pair is labelled with the
/// id of the unit that chose (the leader).
pub(crate) fn pair_by_density(ids: &[i64], density: &[Option<f64>], graph: &Graph) -> Pairing {
    assert_eq!(ids.len(), graph.node_count(), "one id per graph node");
    assert_eq!(density.len(), graph.node_count(), "one density per graph node");

    let mut labels = ids.to_vec();
    let mut paired = vec![false; ids.len()];

    for leader in 0..ids.len() {
        if paired[leader] {
            continue;
        }
        let partner = graph.edges_with_weights(leader)
            .filter(|&(node, _)| !paired[node] && node != leader)
            .min_by(|&(a, wa), &(b, wb)| {
                gap(density[leader], density[a]).total_cmp(&gap(density[leader], density[b]))
                    .then(wb.total_cmp(&wa))
                    .then(ids[a].cmp(&ids[b]))
            })
            .map(|(node, _)| node);

        if let Some(partner) = partner {
            labels[partner] = ids[leader];
            paired[leader] = true;
            paired[partner] = true;
        }
    }

    Pairing { labels, paired }
}
