use std::cmp::Reverse;

/// A change to the original text.
///
/// `text: None` blanks the range. Replacement text never contains newlines;
/// the newlines of the replaced range are re-emitted after it, so every
/// line keeps its number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Edit {
    pub start: usize,
    pub end: usize,
    pub text: Option<String>,
}

impl Edit {
    pub fn blank(start: usize, end: usize) -> Self {
        Self { start, end, text: None }
    }

    pub fn replace(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: Some(text.into()),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at, at, text)
    }
}

pub(crate) fn apply(src: &str, mut edits: Vec<Edit>) -> String {
    // Insertions first, then the widest edit at each offset; anything an
    // earlier edit already covers is dropped.
    edits.sort_by_key(|e| (e.start, e.start != e.end, Reverse(e.end)));

    let mut out = String::with_capacity(src.len() + 256);
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor {
            if edit.text.is_none() && edit.end > cursor {
                blank_into(&mut out, &src[cursor..edit.end]);
                cursor = edit.end;
            }
            continue;
        }
        out.push_str(&src[cursor..edit.start]);
        let removed = &src[edit.start..edit.end];
        match &edit.text {
            None => blank_into(&mut out, removed),
            Some(text) => {
                debug_assert!(!text.contains('\n'));
                out.push_str(text);
                out.extend(removed.matches('\n').map(|_| '\n'));
            }
        }
        cursor = edit.end;
    }
    out.push_str(&src[cursor..]);
    out
}

fn blank_into(out: &mut String, removed: &str) {
    out.extend(removed.chars().map(|c| match c {
        '\n' | '\r' => c,
        _ => ' ',
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blanking_keeps_newlines() {
        let out = apply("a: T\n  | U = 1", vec![Edit::blank(1, 10)]);
        assert_eq!(out, "a   \n      = 1");
    }

    #[test]
    fn replacement_reemits_newlines() {
        let src = "import {\n  a\n} from 'x';\nrun(a);";
        let out = apply(src, vec![Edit::replace(0, 24, "const { a } = require(\"x\");")]);
        assert_eq!(out, "const { a } = require(\"x\");\n\n\nrun(a);");
    }

    #[test]
    fn nested_edits_are_absorbed() {
        let src = "abstract m(): void; n() {}";
        let out = apply(
            src,
            vec![Edit::blank(11, 17), Edit::blank(0, 19), Edit::insert(26, ";")],
        );
        assert_eq!(out, format!("{}n() {{}};", " ".repeat(20)));
    }

    #[test]
    fn overlapping_blanks_extend() {
        let out = apply("abcdef", vec![Edit::blank(0, 3), Edit::blank(2, 5)]);
        assert_eq!(out, "     f");
    }
}
