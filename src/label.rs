//! Unique label generation (spec §4.1).
//!
//! Per spec §9's note that the counter "must be a single shared instance"
//! but reset at the start of each compile run, this is an owned value
//! (not a global/static counter): `lib.rs` constructs exactly one
//! [`LabelGen`] per `compile_*` call and threads it by `&mut` reference
//! into whichever code generator runs, the same way the teacher's
//! `CodeGen` owns its own `fresh_temp`/`fresh_block` counters as plain
//! struct fields (`codegen/state.rs`) rather than reaching for global
//! mutable state.
#[derive(Debug, Default)]
pub struct LabelGen {
    counter: i64,
}

impl LabelGen {
    pub fn new() -> LabelGen {
        LabelGen { counter: -1 }
    }

    /// Increment the counter and return `"<s>_<n>"`.
    pub fn next(&mut self, s: &str) -> String {
        self.counter += 1;
        format!("{s}_{}", self.counter)
    }

    /// A matched entry/exit label pair sharing one counter value, named
    /// `"<s>_<n>"` / `"end_<s>_<n>"`. Used for function start/end labels.
    pub fn next_fn_pair(&mut self, s: &str) -> (String, String) {
        self.counter += 1;
        let n = self.counter;
        (format!("{s}_{n}"), format!("end_{s}_{n}"))
    }

    /// A matched entry/exit label pair sharing one counter value, the exit
    /// label spelled as `s` reversed: `"if_<n>"`/`"fi_<n>"`-style, used for
    /// `if`/`while`/`for` trampolines (`else`/`esle`, `while`/`elihw`,
    /// `for`/`rof`).
    pub fn next_mirrored_pair(&mut self, s: &str) -> (String, String) {
        self.counter += 1;
        let n = self.counter;
        let rev: String = s.chars().rev().collect();
        (format!("{s}_{n}"), format!("{rev}_{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_monotonic_and_unique() {
        let mut gen = LabelGen::new();
        let a = gen.next("if");
        let b = gen.next("if");
        let c = gen.next("while");
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a, "if_0");
        assert_eq!(b, "if_1");
        assert_eq!(c, "while_2");
    }

    #[test]
    fn mirrored_pairs_reverse_the_spelling() {
        let mut gen = LabelGen::new();
        let (else_label, esle_label) = gen.next_mirrored_pair("else");
        assert_eq!(else_label, "else_0");
        assert_eq!(esle_label, "esle_0");

        let (while_label, elihw_label) = gen.next_mirrored_pair("while");
        assert_eq!(while_label, "while_1");
        assert_eq!(elihw_label, "elihw_1");

        let (for_label, rof_label) = gen.next_mirrored_pair("for");
        assert_eq!(for_label, "for_2");
        assert_eq!(rof_label, "rof_2");
    }

    #[test]
    fn fn_pair_names_entry_and_exit_from_one_counter_value() {
        let mut gen = LabelGen::new();
        let (start, end) = gen.next_fn_pair("fib");
        assert_eq!(start, "fib_0");
        assert_eq!(end, "end_fib_0");
    }
}
