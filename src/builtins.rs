use crate::types::Type;

/// Receiver-style operator callable as `target.name(args)`.
///
/// Single source of truth for name, signature, and emitted opcode.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinMethod {
    pub name: &'static str,
    pub opcode: &'static str,
    pub receiver: Type,
    pub params: &'static [Type],
    pub ret: Type,
    /// Arguments are evaluated before the receiver.
    pub args_first: bool,
}

const fn numeric(name: &'static str, opcode: &'static str, params: &'static [Type]) -> BuiltinMethod {
    BuiltinMethod {
        name,
        opcode,
        receiver: Type::Number,
        params,
        ret: Type::Number,
        args_first: false,
    }
}

const fn text(name: &'static str, opcode: &'static str) -> BuiltinMethod {
    BuiltinMethod {
        name,
        opcode,
        receiver: Type::String,
        params: &[],
        ret: Type::String,
        args_first: false,
    }
}

const NUM: Type = Type::Number;

pub static METHODS: &[BuiltinMethod] = &[
    // ── Rounding & sign ─────────────────────────────────────────
    numeric("abs", "abs", &[]),
    numeric("floor", "flr", &[]),
    numeric("eps", "eps", &[]),
    numeric("rnor", "rnor", &[]),
    numeric("d360", "d360", &[]),
    // ── Comparison ──────────────────────────────────────────────
    numeric("min", "min", &[NUM]),
    numeric("max", "max", &[NUM]),
    BuiltinMethod {
        args_first: true,
        ..numeric("range", "rng", &[NUM, NUM])
    },
    // ── Trigonometry ────────────────────────────────────────────
    numeric("sin", "sin", &[]),
    numeric("cos", "cos", &[]),
    numeric("tan", "tg", &[]),
    numeric("ctg", "ctg", &[]),
    numeric("asin", "asin", &[]),
    numeric("acos", "acos", &[]),
    numeric("atan", "atg", &[]),
    numeric("atg2", "atg2", &[NUM]),
    numeric("toDegrees", "rddg", &[]),
    numeric("toRadians", "dgrd", &[]),
    // ── Exponential ─────────────────────────────────────────────
    numeric("square", "sqr", &[]),
    numeric("sqrt", "sqrt", &[]),
    numeric("exp", "exp", &[]),
    numeric("ln", "ln", &[]),
    numeric("log", "log", &[NUM]),
    // ── Strings ─────────────────────────────────────────────────
    text("toLowerCase", "lc"),
    text("toUpperCase", "uc"),
];

pub fn lookup(name: &str) -> Option<&'static BuiltinMethod> {
    METHODS.iter().find(|m| m.name == name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_source_name() {
        assert_eq!(lookup("floor").unwrap().opcode, "flr");
        assert_eq!(lookup("tan").unwrap().opcode, "tg");
        assert_eq!(lookup("toUpperCase").unwrap().receiver, Type::String);
        assert!(lookup("flr").is_none());
    }

    #[test]
    fn only_range_evaluates_arguments_first() {
        let first: Vec<_> = METHODS.iter().filter(|m| m.args_first).map(|m| m.name).collect();
        assert_eq!(first, vec!["range"]);
        assert_eq!(lookup("range").unwrap().params.len(), 2);
    }

    #[test]
    fn names_are_unique() {
        for (i, m) in METHODS.iter().enumerate() {
            assert!(
                METHODS.iter().skip(i + 1).all(|other| other.name != m.name),
                "duplicate builtin: {}",
                m.name
            );
        }
    }
}
