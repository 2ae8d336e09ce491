//! Symbolic precedence anchors and the ladder-navigation helpers that let the
//! parser interpolate an unbounded number of operator precedence levels
//! between any two built-in anchors.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    Low,
    Assignment,
    Infix,
    Sum,
    Prod,
    Prefix,
    Postfix,
    Call,
    High,
}

impl Anchor {
    pub const LADDER: [Anchor; 9] = [
        Anchor::Low,
        Anchor::Assignment,
        Anchor::Infix,
        Anchor::Sum,
        Anchor::Prod,
        Anchor::Prefix,
        Anchor::Postfix,
        Anchor::Call,
        Anchor::High,
    ];

    pub fn value(self) -> i64 {
        // Spaced widely so operator-name anchors (§`AnchorRef::Operator`)
        // can recursively interpolate between any two of these forever.
        (Self::LADDER.iter().position(|a| *a == self).unwrap() as i64) * 1000
    }

    pub fn higher(self) -> Option<Anchor> {
        let idx = Self::LADDER.iter().position(|a| *a == self).unwrap();
        Self::LADDER.get(idx + 1).copied()
    }

    pub fn lower(self) -> Option<Anchor> {
        let idx = Self::LADDER.iter().position(|a| *a == self).unwrap();
        idx.checked_sub(1).map(|i| Self::LADDER[i])
    }

    pub fn from_name(name: &str) -> Option<Anchor> {
        Some(match name {
            "LOW" => Anchor::Low,
            "ASSIGNMENT" => Anchor::Assignment,
            "INFIX" => Anchor::Infix,
            "SUM" => Anchor::Sum,
            "PROD" => Anchor::Prod,
            "PREFIX" => Anchor::Prefix,
            "POSTFIX" => Anchor::Postfix,
            "CALL" => Anchor::Call,
            "HIGH" => Anchor::High,
            _ => return None,
        })
    }
}

/// An anchor reference used by a fix-declaration: either a built-in anchor
/// name, or the name of a previously-declared operator (whose own `high`/`low`
/// anchors are resolved recursively).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorRef {
    Builtin(Anchor),
    Operator(String),
}

impl AnchorRef {
    pub fn parse(name: &str) -> AnchorRef {
        match Anchor::from_name(name) {
            Some(a) => AnchorRef::Builtin(a),
            None => AnchorRef::Operator(name.to_string()),
        }
    }
}

/// Resolves the concrete integer precedence of an anchor pair `(high, low)`,
/// recursing through operator-name anchors via `resolve` (a lookup into the
/// operator registry), and taking the midpoint.
pub fn calculate(
    high: &AnchorRef,
    low: &AnchorRef,
    resolve: &impl Fn(&str) -> (AnchorRef, AnchorRef),
) -> i64 {
    let h = precedence_of(high, resolve);
    let l = precedence_of(low, resolve);
    (h + l) / 2
}

fn precedence_of(anchor: &AnchorRef, resolve: &impl Fn(&str) -> (AnchorRef, AnchorRef)) -> i64 {
    match anchor {
        AnchorRef::Builtin(a) => a.value(),
        AnchorRef::Operator(name) => {
            let (h, l) = resolve(name);
            if h == l {
                precedence_of(&h, resolve)
            } else {
                calculate(&h, &l, resolve)
            }
        }
    }
}

/// `higher`/`lower` over an anchor reference: for a built-in, the next rung
/// in the ladder; for an operator-name anchor whose own `high == low`, recurse
/// into that operator's anchors; otherwise the stored `high`/`low` directly.
pub fn higher_ref(
    anchor: &AnchorRef,
    resolve: &impl Fn(&str) -> (AnchorRef, AnchorRef),
) -> Option<AnchorRef> {
    match anchor {
        AnchorRef::Builtin(a) => a.higher().map(AnchorRef::Builtin),
        AnchorRef::Operator(name) => {
            let (h, l) = resolve(name);
            if h == l {
                higher_ref(&h, resolve)
            } else {
                Some(h)
            }
        }
    }
}

pub fn lower_ref(
    anchor: &AnchorRef,
    resolve: &impl Fn(&str) -> (AnchorRef, AnchorRef),
) -> Option<AnchorRef> {
    match anchor {
        AnchorRef::Builtin(a) => a.lower().map(AnchorRef::Builtin),
        AnchorRef::Operator(name) => {
            let (h, l) = resolve(name);
            if h == l {
                lower_ref(&h, resolve)
            } else {
                Some(l)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_operators(_: &str) -> (AnchorRef, AnchorRef) {
        panic!("no operator anchors registered in this test")
    }

    #[test]
    fn ladder_is_ordered() {
        let values: Vec<i64> = Anchor::LADDER.iter().map(|a| a.value()).collect();
        for w in values.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn higher_of_low_is_assignment() {
        assert_eq!(Anchor::Low.higher(), Some(Anchor::Assignment));
    }

    #[test]
    fn higher_of_high_is_none() {
        assert_eq!(Anchor::High.higher(), None);
    }

    #[test]
    fn midpoint_is_between_anchors() {
        let high = AnchorRef::Builtin(Anchor::Sum);
        let low = AnchorRef::Builtin(Anchor::Infix);
        let mid = calculate(&high, &low, &no_operators);
        assert!(mid > Anchor::Infix.value());
        assert!(mid < Anchor::Sum.value());
    }

    #[test]
    fn operator_anchor_recurses() {
        // `+` sits exactly at SUM; a new operator anchored on `+` with no
        // shift should recurse to `+`'s own anchors and land at the same
        // concrete precedence as `+` itself would if it had no shift.
        let resolve = |name: &str| -> (AnchorRef, AnchorRef) {
            assert_eq!(name, "+");
            (
                AnchorRef::Builtin(Anchor::Sum),
                AnchorRef::Builtin(Anchor::Infix),
            )
        };
        let anchor = AnchorRef::Operator("+".to_string());
        let p = precedence_of(&anchor, &resolve);
        assert_eq!(p, calculate(
            &AnchorRef::Builtin(Anchor::Sum),
            &AnchorRef::Builtin(Anchor::Infix),
            &resolve,
        ));
    }
}
