//! # Min-cut / max-flow
//!
//! This module provides the Boykov-Kolmogorov max-flow algorithm from
//! ("An Experimental Comparison of Min-Cut/Max-Flow Algorithms for Energy Minimization in
//! Vision")[https://doi.org/10.1109/TPAMI.2004.60].
//!
//! Two search trees, rooted at the source and the sink, are grown from the nodes holding terminal
//! capacity. When they touch, flow is pushed along the path joining the roots and the nodes cut
//! off by saturated edges are re-adopted instead of regrowing both trees from scratch.
//!
//! Nodes and edges live in two arenas and are addressed by index. Edges are always allocated in
//! pairs, an edge and its sister (reverse) edge, so the sister of edge `e` is `e ^ 1`.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::collections::VecDeque;

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Residual capacity of an edge, and of the implicit terminal edges of a node.
pub type Capacity = i32;

/// Total flow through the network.
pub type Flow = i64;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Handle of a node in a [`Graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct EdgeId(usize);

/// One of the two implicit terminals of the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminal {
    Source,
    Sink
}

/// Tree membership of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Parent {
    /// Free node, in neither tree.
    None,
    /// Root of its tree, connected directly to the terminal.
    Terminal,
    /// Cut off from its root, waiting for adoption.
    Orphan,
    /// Edge from the node toward its parent.
    Edge(EdgeId)
}

#[derive(Clone, Debug)]
struct Node {
    first: Option<EdgeId>,
    parent: Parent,
    term: Terminal,
    queued: bool,
    timestamp: u32,
    dist: u32,
    cap: Capacity
}

#[derive(Clone, Debug)]
struct Edge {
    head: usize,
    next: Option<EdgeId>,
    cap: Capacity
}

/// A flow network with two implicit terminals.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    flow: Flow,
    active: VecDeque<usize>,
    orphans: VecDeque<usize>,
    time: u32
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl EdgeId {
    fn sister(self) -> EdgeId {
        EdgeId(self.0 ^ 1)
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with room for the given number of nodes and edge pairs.
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            edges: Vec::with_capacity(2 * edges),
            ..Self::default()
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edge pairs.
    pub fn edge_count(&self) -> usize {
        self.edges.len() / 2
    }

    /// Add a free node with no terminal capacity.
    pub fn add_node(&mut self) -> NodeId {
        self.nodes.push(Node {
            first: None,
            parent: Parent::None,
            term: Terminal::Source,
            queued: false,
            timestamp: 0,
            dist: 0,
            cap: 0
        });

        NodeId(self.nodes.len() - 1)
    }

    /// Add an edge from `i` to `j` with capacity `cap_ij` and its reverse with capacity `cap_ji`.
    ///
    /// Both capacities must be non-negative.
    pub fn add_edge(&mut self, i: NodeId, j: NodeId, cap_ij: Capacity, cap_ji: Capacity) {
        debug_assert!(i != j, "self loops are not supported");
        debug_assert!(cap_ij >= 0 && cap_ji >= 0, "edge capacities must be non-negative");

        let forward = EdgeId(self.edges.len());
        let reverse = forward.sister();

        self.edges.push(Edge {
            head: j.0,
            next: self.nodes[i.0].first,
            cap: cap_ij
        });
        self.nodes[i.0].first = Some(forward);

        self.edges.push(Edge {
            head: i.0,
            next: self.nodes[j.0].first,
            cap: cap_ji
        });
        self.nodes[j.0].first = Some(reverse);
    }

    /// Add an edge from `i` to `j` that can never be saturated.
    pub fn add_edge_infinity(&mut self, i: NodeId, j: NodeId) {
        self.add_edge(i, j, Capacity::MAX, 0);
    }

    /// Add capacity to the edges joining `i` to the terminals.
    ///
    /// Only the difference of the two terminal capacities is stored on the node, the part cut
    /// whichever side the node ends up on is counted as flow straight away.
    pub fn add_terminal_weights(&mut self, i: NodeId, cap_source: Capacity, cap_sink: Capacity) {
        let node = &mut self.nodes[i.0];

        let (mut cap_source, mut cap_sink) = (cap_source, cap_sink);
        if node.cap > 0 {
            cap_source += node.cap;
        }
        else {
            cap_sink -= node.cap;
        }

        self.flow += Flow::from(cap_source.min(cap_sink));
        node.cap = cap_source - cap_sink;
    }

    /// Side of the minimum cut node `i` lies on.
    ///
    /// Nodes reached by neither tree could lie on either side, `default` is returned for them.
    pub fn which_side(&self, i: NodeId, default: Terminal) -> Terminal {
        let node = &self.nodes[i.0];
        match node.parent {
            Parent::None => default,
            _ => node.term
        }
    }

    /// Compute the maximum flow from source to sink.
    ///
    /// Afterwards [`Graph::which_side`] gives the minimum cut.
    pub fn max_flow(&mut self) -> Flow {
        self.init();

        let mut current: Option<usize> = None;

        loop {
            let i = match current.take().or_else(|| self.next_active()) {
                Some(i) => i,
                None => break
            };

            let meeting = self.grow_tree(i);
            self.time += 1;

            let meeting = match meeting {
                Some(e) => e,
                None => continue
            };

            // Keep i out of the active queue while the trees are repaired, it is grown again
            // below if it survives.
            self.nodes[i].queued = true;
            self.augment(meeting);
            self.adopt_orphans();
            self.nodes[i].queued = false;

            if self.nodes[i].parent != Parent::None {
                current = Some(i);
            }
        }

        self.flow
    }

    // ---- TREE MAINTENANCE ----

    /// Make every node with terminal capacity the root of a one node tree.
    fn init(&mut self) {
        self.active.clear();
        self.orphans.clear();
        self.time = 0;

        for i in 0..self.nodes.len() {
            let node = &mut self.nodes[i];
            node.queued = false;
            node.timestamp = 0;

            if node.cap == 0 {
                node.parent = Parent::None;
            }
            else {
                node.term = if node.cap > 0 { Terminal::Source } else { Terminal::Sink };
                node.parent = Parent::Terminal;
                node.dist = 1;
                self.set_active(i);
            }
        }
    }

    fn set_active(&mut self, i: usize) {
        if !self.nodes[i].queued {
            self.nodes[i].queued = true;
            self.active.push_back(i);
        }
    }

    /// Pop the next active node.
    ///
    /// Nodes can be queued during adoption and freed later on, those are skipped here instead of
    /// being removed from the queue.
    fn next_active(&mut self) -> Option<usize> {
        while let Some(i) = self.active.pop_front() {
            self.nodes[i].queued = false;
            if self.nodes[i].parent != Parent::None {
                return Some(i);
            }
        }

        None
    }

    fn set_orphan(&mut self, i: usize) {
        self.nodes[i].parent = Parent::Orphan;
        self.orphans.push_back(i);
    }

    /// Residual capacity of `e` in the direction leaving the root of a `term` tree.
    fn residual_from_root(&self, e: EdgeId, term: Terminal) -> Capacity {
        match term {
            Terminal::Source => self.edges[e.0].cap,
            Terminal::Sink => self.edges[e.sister().0].cap
        }
    }

    /// Grow the tree of `i` into its free neighbours.
    ///
    /// Returns the first edge found leading into the other tree.
    fn grow_tree(&mut self, i: usize) -> Option<EdgeId> {
        let term = self.nodes[i].term;

        let mut next = self.nodes[i].first;
        while let Some(e) = next {
            next = self.edges[e.0].next;

            if self.residual_from_root(e, term) <= 0 {
                continue;
            }

            let j = self.edges[e.0].head;
            match self.nodes[j].parent {
                Parent::None => {
                    let (timestamp, dist) = (self.nodes[i].timestamp, self.nodes[i].dist);
                    let node = &mut self.nodes[j];
                    node.term = term;
                    node.parent = Parent::Edge(e.sister());
                    node.timestamp = timestamp;
                    node.dist = dist + 1;
                    self.set_active(j);
                }
                _ if self.nodes[j].term != term => return Some(e),
                _ => {}
            }
        }

        None
    }

    /// Edge toward the parent of a node on an augmenting path, `None` at the root.
    fn path_edge(&self, i: usize) -> Option<EdgeId> {
        match self.nodes[i].parent {
            Parent::Edge(e) => Some(e),
            Parent::Terminal => None,
            Parent::None | Parent::Orphan => unreachable!("augmenting path left its tree")
        }
    }

    /// Push as much flow as possible along the path through the meeting edge.
    fn augment(&mut self, meeting: EdgeId) {
        let middle = if self.nodes[self.edges[meeting.0].head].term == Terminal::Source {
            meeting.sister()
        }
        else {
            meeting
        };

        let bottleneck = self.find_bottleneck(middle);
        self.push_flow(middle, bottleneck);
    }

    /// Smallest residual capacity on the path through `middle`, which must lead from the source
    /// tree into the sink tree.
    fn find_bottleneck(&self, middle: EdgeId) -> Capacity {
        let mut cap = self.edges[middle.0].cap;

        let mut i = self.edges[middle.sister().0].head;
        while let Some(e) = self.path_edge(i) {
            cap = cap.min(self.edges[e.sister().0].cap);
            i = self.edges[e.0].head;
        }
        cap = cap.min(self.nodes[i].cap);

        let mut i = self.edges[middle.0].head;
        while let Some(e) = self.path_edge(i) {
            cap = cap.min(self.edges[e.0].cap);
            i = self.edges[e.0].head;
        }
        cap.min(-self.nodes[i].cap)
    }

    /// Push `f` along the path through `middle`, orphaning the child end of saturated edges.
    fn push_flow(&mut self, middle: EdgeId, f: Capacity) {
        self.flow += Flow::from(f);
        self.edges[middle.sister().0].cap += f;
        self.edges[middle.0].cap -= f;

        // source tree, edges point toward the root against the flow
        let mut i = self.edges[middle.sister().0].head;
        while let Some(e) = self.path_edge(i) {
            self.edges[e.0].cap += f;
            self.edges[e.sister().0].cap -= f;
            if self.edges[e.sister().0].cap == 0 {
                self.set_orphan(i);
            }
            i = self.edges[e.0].head;
        }
        self.nodes[i].cap -= f;
        if self.nodes[i].cap == 0 {
            self.set_orphan(i);
        }

        // sink tree, edges point toward the root along the flow
        let mut i = self.edges[middle.0].head;
        while let Some(e) = self.path_edge(i) {
            self.edges[e.sister().0].cap += f;
            self.edges[e.0].cap -= f;
            if self.edges[e.0].cap == 0 {
                self.set_orphan(i);
            }
            i = self.edges[e.0].head;
        }
        self.nodes[i].cap += f;
        if self.nodes[i].cap == 0 {
            self.set_orphan(i);
        }
    }

    /// Length of the path from `j` to its root, counting `j` and the root, or `None` if the path
    /// runs into an orphan or a free node.
    ///
    /// Distances cached during the current pass are reused, and the root is stamped with the
    /// current time.
    fn dist_to_root(&mut self, j: usize) -> Option<u32> {
        let mut d = 2;
        let mut j = j;

        loop {
            match self.nodes[j].parent {
                Parent::Terminal => break,
                Parent::None | Parent::Orphan => return None,
                Parent::Edge(e) => {
                    if self.nodes[j].timestamp == self.time {
                        return Some(d + self.nodes[j].dist - 1);
                    }
                    d += 1;
                    j = self.edges[e.0].head;
                }
            }
        }

        self.nodes[j].timestamp = self.time;
        self.nodes[j].dist = 1;
        Some(d)
    }

    /// Try to reconnect orphan `i` to its tree, freeing it and its subtree on failure.
    fn process_orphan(&mut self, i: usize) {
        let term = self.nodes[i].term;
        let mut dmin = u32::MAX;

        self.nodes[i].parent = Parent::None;

        let mut next = self.nodes[i].first;
        while let Some(a) = next {
            next = self.edges[a.0].next;

            // flow must be able to reach i from the root through j
            if self.residual_from_root(a.sister(), term) <= 0 {
                continue;
            }

            let j = self.edges[a.0].head;
            if self.nodes[j].term != term || self.nodes[j].parent == Parent::None {
                continue;
            }

            let d = match self.dist_to_root(j) {
                Some(d) => d,
                None => continue
            };

            if d < dmin {
                let node = &mut self.nodes[i];
                node.parent = Parent::Edge(a);
                node.timestamp = self.time;
                node.dist = d;
                dmin = d;
            }

            // stamp the path walked by dist_to_root
            let mut j = j;
            let mut d = d;
            while self.nodes[j].timestamp != self.time {
                self.nodes[j].timestamp = self.time;
                self.nodes[j].dist = d;
                d -= 1;
                j = match self.nodes[j].parent {
                    Parent::Edge(e) => self.edges[e.0].head,
                    _ => break
                };
            }
        }

        if self.nodes[i].parent != Parent::None {
            return;
        }

        let mut next = self.nodes[i].first;
        while let Some(a) = next {
            next = self.edges[a.0].next;

            let j = self.edges[a.0].head;
            let parent = self.nodes[j].parent;
            if self.nodes[j].term != term || parent == Parent::None {
                continue;
            }

            if let Parent::Edge(e) = parent {
                if self.edges[e.0].head == i {
                    self.set_orphan(j);
                }
            }
            if self.residual_from_root(a.sister(), term) > 0 {
                self.set_active(j);
            }
        }
    }

    fn adopt_orphans(&mut self) {
        while let Some(i) = self.orphans.pop_front() {
            self.process_orphan(i);
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
