//! `%v`/`%t` format-string rewriting for `print` and `sprintf`
//!
//! Format strings arrive with their escapes still spelled out (`\n` is a
//! backslash and an `n`), so the rewritten text can be emitted into the C
//! literal verbatim.

use super::infer::CType;

/// What to do with the argument consumed by a `%v`/`%t` hole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgAction {
    /// Emit the argument as-is
    Plain,
    /// Wrap the argument in `__print_array_helper(…)`
    WrapArrayHelper,
    /// Replace the argument with this type-name string literal
    TypeName(&'static str),
}

#[derive(Debug)]
pub struct RewrittenFormat {
    pub format: String,
    /// One action per consumed argument, in order
    pub actions: Vec<ArgAction>,
}

/// Rewrite a format string against the inferred argument types.
///
/// `%v` becomes the specifier for the argument's type (arrays become `%s`
/// with the argument wrapped); `%t` becomes `%s` with the argument replaced
/// by the type name; any other `%` sequence passes through. With
/// `append_newline` (the `print` path) the result gets exactly one trailing
/// `\n`.
pub fn rewrite_format(format: &str, arg_types: &[CType], append_newline: bool) -> RewrittenFormat {
    let mut out = String::with_capacity(format.len() + 2);
    let mut actions = Vec::new();
    let mut next_arg = 0usize;
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('v') => {
                let ty = arg_types.get(next_arg).copied().unwrap_or(CType::Int);
                next_arg += 1;
                if ty == CType::Array {
                    out.push_str("%s");
                    actions.push(ArgAction::WrapArrayHelper);
                } else {
                    out.push_str(ty.format_spec());
                    actions.push(ArgAction::Plain);
                }
            }
            Some('t') => {
                let ty = arg_types.get(next_arg).copied().unwrap_or(CType::Int);
                next_arg += 1;
                out.push_str("%s");
                actions.push(ArgAction::TypeName(ty.type_name()));
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }

    if append_newline && !out.ends_with("\\n") {
        out.push_str("\\n");
    }

    RewrittenFormat { format: out, actions }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v_specifiers_by_type() {
        let rewritten = rewrite_format(
            "%v %v %v %v %v",
            &[CType::Int, CType::Float, CType::Str, CType::Char, CType::Bool],
            false,
        );
        assert_eq!(rewritten.format, "%d %f %s %c %d");
        assert_eq!(rewritten.actions, vec![ArgAction::Plain; 5]);
    }

    #[test]
    fn test_v_array_wraps_helper() {
        let rewritten = rewrite_format("%v", &[CType::Array], false);
        assert_eq!(rewritten.format, "%s");
        assert_eq!(rewritten.actions, vec![ArgAction::WrapArrayHelper]);
    }

    #[test]
    fn test_t_replaces_with_type_name() {
        let rewritten = rewrite_format("%t", &[CType::Float], false);
        assert_eq!(rewritten.format, "%s");
        assert_eq!(rewritten.actions, vec![ArgAction::TypeName("float")]);
    }

    #[test]
    fn test_other_specifiers_pass_through() {
        let rewritten = rewrite_format("%d %% %x", &[], false);
        assert_eq!(rewritten.format, "%d %% %x");
        assert!(rewritten.actions.is_empty());
    }

    #[test]
    fn test_print_appends_single_newline() {
        assert_eq!(rewrite_format("hello", &[], true).format, "hello\\n");
        // Already terminated: nothing added
        assert_eq!(rewrite_format("hello\\n", &[], true).format, "hello\\n");
    }

    #[test]
    fn test_sprintf_does_not_append() {
        assert_eq!(rewrite_format("hello", &[], false).format, "hello");
    }

    #[test]
    fn test_missing_args_default_to_int() {
        let rewritten = rewrite_format("%v %v", &[CType::Str], false);
        assert_eq!(rewritten.format, "%s %d");
    }
}
