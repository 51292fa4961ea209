//! Prefix nodes and their edge map, stored as an arena.
//!
//! Nodes are immutable once built and addressed by index. Each node holds
//! the full action-list from the start of the move, so two nodes are equal
//! exactly when their action-lists are.

use crate::board::{Action, ActionList};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Index of a node inside its [`Arena`].
pub(crate) type NodeId = usize;

/// The root always sits at index 0.
pub(crate) const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    actions: ActionList,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// The action-list is itself a legal move.
    complete: bool,
}

/// Compressed prefix tree over a set of action-lists.
#[derive(Debug, Clone)]
pub(crate) struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    /// Builds the maximally compressed tree for `moves`.
    ///
    /// Duplicate action-lists collapse first, so no two siblings can carry
    /// the same subtree.
    #[instrument(skip(moves), fields(moves = moves.len()))]
    pub(crate) fn build(moves: &[ActionList]) -> Self {
        let mut seen = HashSet::new();
        let unique: Vec<&ActionList> = moves.iter().filter(|m| seen.insert(*m)).collect();
        let arena = Self::trie(&unique).compact();
        debug!(nodes = arena.nodes.len(), "Built resolution arena");
        arena
    }

    /// One node per action step.
    fn trie(moves: &[&ActionList]) -> Self {
        let mut trie = Self {
            nodes: vec![Node {
                actions: Vec::new(),
                parent: None,
                children: Vec::new(),
                complete: false,
            }],
        };
        for actions in moves {
            let mut current = ROOT;
            for depth in 0..actions.len() {
                let next = trie.nodes[current]
                    .children
                    .iter()
                    .copied()
                    .find(|&child| trie.nodes[child].actions[depth] == actions[depth]);
                current = match next {
                    Some(child) => child,
                    None => {
                        let id = trie.nodes.len();
                        trie.nodes.push(Node {
                            actions: actions[..=depth].to_vec(),
                            parent: Some(current),
                            children: Vec::new(),
                            complete: false,
                        });
                        trie.nodes[current].children.push(id);
                        id
                    }
                };
            }
            trie.nodes[current].complete = true;
        }
        trie
    }

    /// Rebuilds the trie into a fresh arena, skipping every node that has a
    /// single child and does not end a legal move.
    fn compact(&self) -> Self {
        let mut out = Self { nodes: Vec::new() };
        let root = self.skip_chain(ROOT);
        out.nodes.push(Node {
            actions: self.nodes[root].actions.clone(),
            parent: None,
            children: Vec::new(),
            complete: self.nodes[root].complete,
        });
        let mut pending = vec![(root, ROOT)];
        while let Some((source, target)) = pending.pop() {
            for &child in &self.nodes[source].children {
                let kept = self.skip_chain(child);
                let id = out.nodes.len();
                out.nodes.push(Node {
                    actions: self.nodes[kept].actions.clone(),
                    parent: Some(target),
                    children: Vec::new(),
                    complete: self.nodes[kept].complete,
                });
                out.nodes[target].children.push(id);
                pending.push((kept, id));
            }
        }
        out
    }

    fn skip_chain(&self, mut id: NodeId) -> NodeId {
        while !self.nodes[id].complete && self.nodes[id].children.len() == 1 {
            id = self.nodes[id].children[0];
        }
        id
    }

    /// Full action-list of a node.
    pub(crate) fn actions(&self, id: NodeId) -> &ActionList {
        &self.nodes[id].actions
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub(crate) fn is_complete(&self, id: NodeId) -> bool {
        self.nodes[id].complete
    }

    /// Actions consumed between a node's parent and the node.
    ///
    /// For the root this is its whole action-list.
    pub(crate) fn edge(&self, id: NodeId) -> &[Action] {
        let start = self
            .parent(id)
            .map(|parent| self.nodes[parent].actions.len())
            .unwrap_or(0);
        &self.nodes[id].actions[start..]
    }

    /// First action on the edge into `id`.
    pub(crate) fn next_action(&self, id: NodeId) -> Option<&Action> {
        self.edge(id).first()
    }

    /// Every legal move in the subtree rooted at `id`.
    pub(crate) fn moves_under(&self, id: NodeId) -> Vec<ActionList> {
        let mut moves = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if self.nodes[node].complete {
                moves.push(self.nodes[node].actions.clone());
            }
            stack.extend(self.nodes[node].children.iter().rev());
        }
        moves
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.nodes.len()
    }
}
