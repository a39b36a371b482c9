//! Chaitin-style graph-coloring register allocator.
//!
//! Takes the per-function virtual-register IR the register code generator
//! produces and assigns each virtual register id a small positive color,
//! live ranges permitting reuse of the same color for non-interfering
//! registers exactly the way two non-overlapping local variables can share
//! one stack slot. Colors 1-9 are physical (the emitter's fixed register
//! table); any color 10 or above signals a spill, handled entirely by the
//! emitter via a pair of scratch registers, since the degree-10 simplify
//! threshold below is sized to the physical table's width, not a hard cap
//! on how many distinct colors a pathological function could need.

use std::collections::{HashMap, HashSet};

use crate::ir::{Instruction, Op};

use super::register::FunctionBlock;

/// Run allocation independently over every function block, then
/// concatenate the renamed blocks into one flat sequence ready for the
/// emitter. Colors are tracked in one map across all blocks: separate
/// functions never share an edge, so this is purely a bookkeeping
/// convenience, not something that changes any block's own coloring.
pub fn allocate(blocks: Vec<FunctionBlock>) -> Vec<Instruction> {
    let mut colors: HashMap<u32, u32> = HashMap::new();
    let mut out = Vec::new();
    for block in blocks {
        color_block(&block, &mut colors);
        out.extend(rename(block, &colors));
    }
    out
}

#[derive(Default, Clone)]
struct DefUse {
    def: Option<u32>,
    uses: Vec<u32>,
}

fn def_use(instr: &Instruction) -> DefUse {
    match instr.op {
        Op::Move => {
            let src = instr.args[0].reg_id();
            let dst = instr.args[1].reg_id();
            DefUse {
                def: dst,
                uses: src.into_iter().collect(),
            }
        }
        op if op.is_arith() => {
            let a = instr.args[0].reg_id();
            let b = instr.args[1].reg_id();
            DefUse {
                def: b,
                uses: [a, b].into_iter().flatten().collect(),
            }
        }
        Op::Cmp => {
            let a = instr.args[0].reg_id();
            let b = instr.args[1].reg_id();
            DefUse {
                def: None,
                uses: [a, b].into_iter().flatten().collect(),
            }
        }
        Op::Push => DefUse {
            def: None,
            uses: instr.args.first().and_then(|o| o.reg_id()).into_iter().collect(),
        },
        _ => DefUse::default(),
    }
}

/// Label binding: the first register-touching instruction following each
/// `LABEL`.
fn bind_labels(block: &[Instruction]) -> HashMap<String, usize> {
    let mut labels = HashMap::new();
    for (i, instr) in block.iter().enumerate() {
        if let Some(name) = instr.label_name() {
            if let Some(target) = block[i + 1..].iter().position(|ins| ins.touches_register()) {
                labels.insert(name.to_string(), i + 1 + target);
            }
        }
    }
    labels
}

/// The CFG over register-touching instructions: every such instruction
/// links forward to the next one in program order, and every jump to a
/// label additionally links its nearest preceding register-touching
/// instruction to that label's bound target.
fn build_cfg(block: &[Instruction]) -> (Vec<usize>, HashMap<usize, Vec<usize>>) {
    let labels = bind_labels(block);
    let nodes: Vec<usize> = (0..block.len()).filter(|&i| block[i].touches_register()).collect();

    let mut succ: HashMap<usize, Vec<usize>> = HashMap::new();
    for w in nodes.windows(2) {
        succ.entry(w[0]).or_default().push(w[1]);
    }

    for (i, instr) in block.iter().enumerate() {
        let is_jump = instr.op == Op::Jmp || instr.op.is_cond_jump();
        if !is_jump {
            continue;
        }
        let Some(label_name) = instr.args.first().and_then(|o| match &o.target.val {
            Some(crate::ir::TargetVal::Label(s)) => Some(s.as_str()),
            _ => None,
        }) else {
            continue;
        };
        let Some(&target) = labels.get(label_name) else {
            continue;
        };
        if let Some(&pred) = nodes.iter().rev().find(|&&n| n <= i) {
            succ.entry(pred).or_default().push(target);
        }
    }
    (nodes, succ)
}

/// Backward liveness to a fixed point over the register-touching nodes.
fn liveness(
    nodes: &[usize],
    succ: &HashMap<usize, Vec<usize>>,
    def_use: &HashMap<usize, DefUse>,
) -> HashMap<usize, HashSet<u32>> {
    let mut live_in: HashMap<usize, HashSet<u32>> = nodes.iter().map(|&n| (n, HashSet::new())).collect();
    let mut live_out: HashMap<usize, HashSet<u32>> = nodes.iter().map(|&n| (n, HashSet::new())).collect();

    loop {
        let mut changed = false;
        for &n in nodes.iter().rev() {
            let mut new_out = HashSet::new();
            if let Some(succs) = succ.get(&n) {
                for s in succs {
                    new_out.extend(live_in[s].iter().copied());
                }
            }
            let du = &def_use[&n];
            let mut new_in: HashSet<u32> = du.uses.iter().copied().collect();
            for &v in &new_out {
                if Some(v) != du.def {
                    new_in.insert(v);
                }
            }
            if new_in != live_in[&n] {
                live_in.insert(n, new_in);
                changed = true;
            }
            if new_out != live_out[&n] {
                live_out.insert(n, new_out);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    live_in
}

/// Adjacency plus insertion order, so "first available" and "first
/// remaining" tie-breaks are deterministic.
struct Graph {
    order: Vec<u32>,
    adj: HashMap<u32, Vec<u32>>,
}

impl Graph {
    fn new() -> Graph {
        Graph {
            order: Vec::new(),
            adj: HashMap::new(),
        }
    }

    fn touch(&mut self, r: u32) {
        self.adj.entry(r).or_insert_with(|| {
            self.order.push(r);
            Vec::new()
        });
    }

    fn edge(&mut self, a: u32, b: u32) {
        if a == b {
            return;
        }
        self.touch(a);
        self.touch(b);
        if !self.adj[&a].contains(&b) {
            self.adj.get_mut(&a).unwrap().push(b);
        }
        if !self.adj[&b].contains(&a) {
            self.adj.get_mut(&b).unwrap().push(a);
        }
    }
}

/// Nodes come strictly from live-in membership (spec §4.6 phase 4: "for
/// each instruction ... add an edge between every pair of distinct
/// live-in registers"), not from every register any instruction happens
/// to mention. A virtual register that is defined but never subsequently
/// read — the register codegen's `SR` cache filled in and dropped on
/// scope exit without ever being read again — never appears in any
/// live-in set, so it never becomes a node here, is never colored, and
/// its defining `MOVE` is left for the emitter's dead-move elimination
/// (spec §4.7) to drop.
fn build_interference(nodes: &[usize], live_in: &HashMap<usize, HashSet<u32>>) -> Graph {
    let mut g = Graph::new();
    for &n in nodes {
        let live: Vec<u32> = live_in[&n].iter().copied().collect();
        for &r in &live {
            g.touch(r);
        }
        for i in 0..live.len() {
            for j in (i + 1)..live.len() {
                g.edge(live[i], live[j]);
            }
        }
    }
    g
}

fn color_block(block: &[Instruction], colors: &mut HashMap<u32, u32>) {
    let def_use: HashMap<usize, DefUse> = (0..block.len())
        .filter(|&i| block[i].touches_register())
        .map(|i| (i, def_use(&block[i])))
        .collect();
    let (nodes, succ) = build_cfg(block);
    let live_in = liveness(&nodes, &succ, &def_use);
    let graph = build_interference(&nodes, &live_in);

    let mut remaining: Vec<u32> = graph.order.clone();
    let mut stack: Vec<(u32, Vec<u32>)> = Vec::new();

    while !remaining.is_empty() {
        let low_degree = remaining
            .iter()
            .find(|r| graph.adj[r].iter().filter(|n| remaining.contains(n)).count() < 10)
            .copied();
        let pick = low_degree.unwrap_or(remaining[0]);

        let neighbors = graph.adj[&pick].clone();
        stack.push((pick, neighbors));
        remaining.retain(|&r| r != pick);
    }

    while let Some((node, neighbors)) = stack.pop() {
        let used: HashSet<u32> = neighbors.iter().filter_map(|n| colors.get(n).copied()).collect();
        let mut c = 1;
        while used.contains(&c) {
            c += 1;
        }
        colors.insert(node, c);
    }
}

fn rename(block: FunctionBlock, colors: &HashMap<u32, u32>) -> Vec<Instruction> {
    block
        .into_iter()
        .map(|mut instr| {
            for arg in &mut instr.args {
                if arg.target.reg_id().is_some() {
                    arg.target.val = colors
                        .get(&arg.target.reg_id().unwrap())
                        .map(|&c| crate::ir::TargetVal::Reg(c));
                }
            }
            instr
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Meta, Op, Operand, Target};

    fn mov(src: u32, dst: u32) -> Instruction {
        Instruction::new(Op::Move, vec![Operand::direct(Target::reg(src)), Operand::direct(Target::reg(dst))])
    }

    fn mov_imm(v: i64, dst: u32) -> Instruction {
        Instruction::new(Op::Move, vec![Operand::direct(Target::imm(v)), Operand::direct(Target::reg(dst))])
    }

    /// Three registers simultaneously live (no two may share a color) —
    /// spec §8 testable property 4.
    #[test]
    fn simultaneously_live_registers_get_distinct_colors() {
        let block = vec![
            mov_imm(1, 0),
            mov_imm(2, 1),
            mov_imm(3, 2),
            Instruction::new(Op::Add, vec![Operand::direct(Target::reg(1)), Operand::direct(Target::reg(0))]),
            Instruction::new(Op::Add, vec![Operand::direct(Target::reg(2)), Operand::direct(Target::reg(0))]),
            Instruction::new(Op::Move, vec![Operand::direct(Target::reg(0)), Operand::direct(Target::rrt())]),
        ];
        let out = allocate(vec![block]);
        // The first three MOVEs define reg 0, 1, 2 respectively; all three
        // are simultaneously live at the point the second ADD runs, so
        // their assigned colors must be pairwise distinct.
        let moves: Vec<u32> = out[0..3]
            .iter()
            .map(|i| i.args[1].reg_id().expect("still a register after coloring"))
            .collect();
        assert_ne!(moves[0], moves[1]);
        assert_ne!(moves[0], moves[2]);
        assert_ne!(moves[1], moves[2]);
        assert!(moves.iter().all(|&c| (1..=10).contains(&c)));
    }

    /// A register defined but never read again (the register codegen's
    /// `SR` cache filled in and abandoned on scope exit) is never a node
    /// in the interference graph and so is left uncolored — the emitter's
    /// dead-move elimination is what actually discards it (spec §4.7).
    #[test]
    fn dead_register_is_never_colored() {
        let block = vec![
            mov_imm(5, 0),
            Instruction::meta(Meta::Ret),
        ];
        let out = allocate(vec![block]);
        let first = out.iter().find(|i| i.op == Op::Move).unwrap();
        assert!(first.args[1].reg_id().is_none());
    }
}
