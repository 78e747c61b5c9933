// Dependency ordering of transactions within one block or mempool batch

use crate::core::{Hash256, Transaction};
use crate::error::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Topological order of nodes `0..parents.len()`, parents first.
///
/// Depth-first over an explicit stack with a per-node mark, so long chains
/// cannot exhaust the call stack. Nodes with no pending parents keep their
/// input order. On a cycle, returns a node that lies on it.
fn order_graph(parents: &[Vec<usize>]) -> std::result::Result<Vec<usize>, usize> {
    let mut marks = vec![Mark::Unvisited; parents.len()];
    let mut order = Vec::with_capacity(parents.len());
    // (node, index of the next parent to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..parents.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::Visiting;
        stack.push((root, 0));

        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            match parents[node].get(*next) {
                Some(&parent) => {
                    *next += 1;
                    match marks[parent] {
                        Mark::Done => {}
                        Mark::Visiting => return Err(parent),
                        Mark::Unvisited => {
                            marks[parent] = Mark::Visiting;
                            stack.push((parent, 0));
                        }
                    }
                }
                None => {
                    marks[node] = Mark::Done;
                    order.push(node);
                    stack.pop();
                }
            }
        }
    }

    Ok(order)
}

/// Positions of `transactions` ordered so that every transaction comes after
/// the in-set transactions whose outputs it spends.
pub fn dependency_order(transactions: &[Transaction]) -> Result<Vec<usize>> {
    let txids: Vec<Hash256> = transactions.iter().map(Transaction::txid).collect();
    let positions: HashMap<Hash256, usize> =
        txids.iter().enumerate().map(|(pos, txid)| (*txid, pos)).collect();

    let parents: Vec<Vec<usize>> = transactions
        .iter()
        .map(|tx| {
            tx.spent_outputs()
                .filter_map(|prev| positions.get(&prev.txid).copied())
                .collect()
        })
        .collect();

    order_graph(&parents).map_err(|pos| Error::CyclicGraph(txids[pos]))
}

/// Transactions in forward dependency order
pub fn sort_transactions(transactions: &[Transaction]) -> Result<Vec<&Transaction>> {
    Ok(dependency_order(transactions)?
        .into_iter()
        .map(|pos| &transactions[pos])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OutPoint, TxInput, TxOutput};

    fn funding(tag: u8) -> Transaction {
        Transaction::new(
            vec![TxInput::coinbase(vec![tag])],
            vec![TxOutput::new(1000, vec![tag]), TxOutput::new(2000, vec![tag])],
        )
    }

    fn spend(parents: &[(&Transaction, u32)], tag: u8) -> Transaction {
        let inputs = parents
            .iter()
            .map(|(tx, index)| TxInput::new(OutPoint::new(tx.txid(), *index), vec![tag]))
            .collect();
        Transaction::new(inputs, vec![TxOutput::new(500, vec![tag])])
    }

    fn assert_parents_first(sorted: &[&Transaction]) {
        let positions: HashMap<Hash256, usize> =
            sorted.iter().enumerate().map(|(i, tx)| (tx.txid(), i)).collect();
        for (i, tx) in sorted.iter().enumerate() {
            for prev in tx.spent_outputs() {
                if let Some(&j) = positions.get(&prev.txid) {
                    assert!(j < i, "parent at {} after child at {}", j, i);
                }
            }
        }
    }

    #[test]
    fn test_parents_precede_children() {
        let a = funding(1);
        let b = spend(&[(&a, 0)], 2);
        let c = spend(&[(&b, 0), (&a, 1)], 3);
        let d = funding(4);

        let input = vec![c.clone(), d.clone(), b.clone(), a.clone()];
        let sorted = sort_transactions(&input).unwrap();

        assert_eq!(sorted.len(), 4);
        assert_parents_first(&sorted);
        let ids: Vec<Hash256> = sorted.iter().map(|tx| tx.txid()).collect();
        assert_eq!(ids, vec![a.txid(), b.txid(), c.txid(), d.txid()]);
    }

    #[test]
    fn test_independent_transactions_keep_order() {
        let input = vec![funding(1), funding(2), funding(3)];
        assert_eq!(dependency_order(&input).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_out_of_set_inputs_are_ignored() {
        let outside = funding(9);
        let tx = spend(&[(&outside, 0)], 1);
        assert_eq!(dependency_order(&[tx]).unwrap(), vec![0]);
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let mut chain = vec![funding(0)];
        for n in 1..5000u32 {
            let prev = chain.last().unwrap().clone();
            chain.push(spend(&[(&prev, 0)], (n % 251) as u8));
        }
        chain.reverse();

        let sorted = sort_transactions(&chain).unwrap();
        assert_eq!(sorted[0].txid(), chain[chain.len() - 1].txid());
        assert_parents_first(&sorted);
    }

    #[test]
    fn test_graph_cycles_detected() {
        // 0 -> 1 -> 2 -> 0
        let parents = vec![vec![2], vec![0], vec![1]];
        assert!(order_graph(&parents).is_err());

        // self loop
        assert_eq!(order_graph(&[vec![0]]), Err(0));
    }

    #[test]
    fn test_graph_diamond() {
        // 3 spends 1 and 2, both spend 0
        let parents = vec![vec![], vec![0], vec![0], vec![1, 2]];
        assert_eq!(order_graph(&parents).unwrap(), vec![0, 1, 2, 3]);

        let reversed = vec![vec![1, 2], vec![3], vec![3], vec![]];
        assert_eq!(order_graph(&reversed).unwrap(), vec![3, 1, 2, 0]);
    }
}
