//! Lightweight structural queries on SMILES component identifiers.
//!
//! These helpers work on the written string. Only [`elements`] walks the atom
//! sequence, counting bonds to infer implicit hydrogens. No canonicalization
//! is attempted.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

// =============================================================================
// LAZY STATIC PATTERNS
// =============================================================================

static TETRAHEDRAL_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"@@?").unwrap());

static BRACKET_ATOM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());

static BRACKET_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)?([A-Z][a-z]?|se|as|[bcnops])(@@?)?(H\d*)?([+-]+\d*)?(:\d+)?$").unwrap()
});


/// Return the mirror image of a SMILES string by inverting every
/// tetrahedral tag (`@` becomes `@@` and vice versa).
pub fn mirror_image(smiles: &str) -> String {
    TETRAHEDRAL_TAG
        .replace_all(smiles, |caps: &regex::Captures| {
            if &caps[0] == "@@" { "@" } else { "@@" }
        })
        .into_owned()
}

/// Whether the SMILES string declares any tetrahedral stereocenter.
pub fn has_stereocenters(smiles: &str) -> bool {
    TETRAHEDRAL_TAG.is_match(smiles)
}

/// Whether the SMILES string describes more than one disconnected fragment.
pub fn is_multi_fragment(smiles: &str) -> bool {
    smiles.contains('.')
}

/// Sum of the formal charges written on bracket atoms.
pub fn formal_charge(smiles: &str) -> i32 {
    BRACKET_ATOM
        .captures_iter(smiles)
        .filter_map(|caps| caps.get(1))
        .filter_map(|inner| BRACKET_CONTENT.captures(inner.as_str()))
        .filter_map(|content| content.get(5).map(|m| parse_charge(m.as_str())))
        .sum()
}

/// Element symbols of the SMILES string, including hydrogen.
///
/// Aromatic (lower case) atoms are reported by their element symbol. Hydrogen
/// is reported when written inside a bracket atom, or when an unbracketed
/// organic-subset atom has bonds left over below its default valence.
pub fn elements(smiles: &str) -> BTreeSet<String> {
    let atoms = scan_atoms(smiles);

    let mut symbols: BTreeSet<String> = atoms
        .iter()
        .map(|atom| normalize_symbol(&atom.symbol))
        .collect();

    if atoms.iter().any(Atom::carries_hydrogen) {
        symbols.insert("H".to_string());
    }

    symbols
}

// =============================================================================
// ATOM SCAN
// =============================================================================

/// An atom found while scanning a SMILES string.
#[derive(Debug)]
struct Atom {
    symbol: String,
    aromatic: bool,
    bracketed: bool,
    explicit_hydrogen: bool,
    bond_order: u32,
}

impl Atom {
    fn carries_hydrogen(&self) -> bool {
        if self.bracketed {
            return self.explicit_hydrogen;
        }

        // Aromatic atoms use one valence unit for the delocalized bond.
        let used = self.bond_order + u32::from(self.aromatic);
        default_valences(&self.symbol)
            .iter()
            .find(|valence| **valence >= used)
            .is_some_and(|valence| *valence > used)
    }
}

fn default_valences(symbol: &str) -> &'static [u32] {
    match symbol.to_ascii_uppercase().as_str() {
        "B" => &[3],
        "C" => &[4],
        "N" => &[3, 5],
        "O" => &[2],
        "P" => &[3, 5],
        "S" => &[2, 4, 6],
        "F" | "CL" | "BR" | "I" => &[1],
        _ => &[],
    }
}

fn bond(atoms: &mut [Atom], a: usize, b: usize, order: u32) {
    atoms[a].bond_order += order;
    atoms[b].bond_order += order;
}

/// Walk the SMILES string, recording atoms and the bond order each carries.
fn scan_atoms(smiles: &str) -> Vec<Atom> {
    let mut atoms: Vec<Atom> = Vec::new();
    let mut previous: Option<usize> = None;
    let mut branches: Vec<Option<usize>> = Vec::new();
    let mut rings: HashMap<String, (usize, Option<u32>)> = HashMap::new();
    let mut pending: Option<u32> = None;

    let mut rest = smiles;
    while let Some(c) = rest.chars().next() {
        let mut atom = None;
        let mut consumed = c.len_utf8();

        match c {
            '[' => {
                let end = rest.find(']').map_or(rest.len(), |i| i + 1);
                let inner = rest[1..end].trim_end_matches(']');
                consumed = end;
                if let Some(content) = BRACKET_CONTENT.captures(inner) {
                    atom = Some(Atom {
                        symbol: content[2].to_string(),
                        aromatic: content[2].starts_with(|c: char| c.is_ascii_lowercase()),
                        bracketed: true,
                        explicit_hydrogen: content.get(4).is_some(),
                        bond_order: 0,
                    });
                }
            }
            '(' => branches.push(previous),
            ')' => previous = branches.pop().flatten(),
            '.' => {
                previous = None;
                pending = None;
            }
            '-' | '/' | '\\' | ':' => pending = Some(1),
            '=' => pending = Some(2),
            '#' => pending = Some(3),
            '$' => pending = Some(4),
            '0'..='9' | '%' => {
                let label = if c == '%' {
                    let digits = rest[1..].chars().take_while(char::is_ascii_digit).count();
                    consumed = 1 + digits;
                    rest[1..consumed].to_string()
                } else {
                    c.to_string()
                };

                if let Some(current) = previous {
                    match rings.remove(&label) {
                        Some((opened, order)) => {
                            let order = pending.or(order).unwrap_or(1);
                            bond(&mut atoms, opened, current, order);
                        }
                        None => {
                            rings.insert(label, (current, pending));
                        }
                    }
                }
                pending = None;
            }
            _ => {
                let symbol = ["Cl", "Br"]
                    .into_iter()
                    .find(|s| rest.starts_with(s))
                    .unwrap_or(&rest[..consumed]);
                consumed = symbol.len();

                if !default_valences(symbol).is_empty() {
                    atom = Some(Atom {
                        symbol: symbol.to_string(),
                        aromatic: symbol.starts_with(|c: char| c.is_ascii_lowercase()),
                        bracketed: false,
                        explicit_hydrogen: false,
                        bond_order: 0,
                    });
                }
            }
        }

        if let Some(atom) = atom {
            atoms.push(atom);
            let current = atoms.len() - 1;
            if let Some(previous) = previous {
                bond(&mut atoms, previous, current, pending.unwrap_or(1));
            }
            previous = Some(current);
            pending = None;
        }

        rest = &rest[consumed..];
    }

    atoms
}

fn normalize_symbol(symbol: &str) -> String {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Parse a SMILES charge suffix: `+`, `++`, `+2`, `-`, `--`, `-3`.
fn parse_charge(charge: &str) -> i32 {
    let sign = if charge.starts_with('-') { -1 } else { 1 };
    let signs = charge.chars().take_while(|c| *c == '+' || *c == '-').count() as i32;
    let digits = &charge[signs as usize..];

    match digits.parse::<i32>() {
        Ok(magnitude) => sign * magnitude,
        Err(_) => sign * signs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_image_inverts_tags() {
        assert_eq!(mirror_image("C[C@H](O)CC"), "C[C@@H](O)CC");
        assert_eq!(mirror_image("C[C@@H](O)CC"), "C[C@H](O)CC");
        assert_eq!(mirror_image("N[C@@H](C)[C@H](O)C"), "N[C@H](C)[C@@H](O)C");
        assert_eq!(mirror_image("CCO"), "CCO");
    }

    #[test]
    fn test_has_stereocenters() {
        assert!(has_stereocenters("C[C@H](O)CC"));
        assert!(!has_stereocenters("CCO"));
    }

    #[test]
    fn test_formal_charge() {
        assert_eq!(formal_charge("CCO"), 0);
        assert_eq!(formal_charge("[NH4+]"), 1);
        assert_eq!(formal_charge("[O-]C(=O)C"), -1);
        assert_eq!(formal_charge("[Ca+2]"), 2);
        assert_eq!(formal_charge("[Fe++]"), 2);
        assert_eq!(formal_charge("C[N+](C)(C)C.[Cl-]"), 0);
    }

    #[test]
    fn test_formal_charge_sums_every_bracket() {
        assert_eq!(formal_charge("[Na+].[Na+].[O-]S(=O)(=O)[O-]"), 0);
        assert_eq!(formal_charge("[NH4+].[NH4+].[Cl-]"), 1);
        assert_eq!(formal_charge("[Ca+2].[Cl-]"), 1);
        assert_eq!(formal_charge("[13CH4]"), 0);
    }

    #[test]
    fn test_elements() {
        let symbols = elements("ClC(Cl)Cl");
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["C", "Cl", "H"]);

        let symbols = elements("ClC(Cl)(Cl)Cl");
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["C", "Cl"]);

        let symbols = elements("c1ccncc1");
        assert!(symbols.contains("C"));
        assert!(symbols.contains("N"));

        let symbols = elements("[Na+].[Cl-]");
        assert!(symbols.contains("Na"));
        assert!(symbols.contains("Cl"));
        assert!(!symbols.contains("N"));

        assert!(elements("[nH]1cccc1").contains("H"));
        assert!(!elements("[Na+].[Cl-]").contains("H"));
    }

    #[test]
    fn test_elements_infers_implicit_hydrogen() {
        assert!(elements("CCO").contains("H"));
        assert!(elements("O").contains("H"));
        assert!(elements("c1ccccc1").contains("H"));
        assert!(elements("C#N").contains("H"));

        assert!(!elements("O=C=O").contains("H"));
        assert!(!elements("N#N").contains("H"));
        assert!(!elements("FC(F)(F)C(F)(F)F").contains("H"));
        assert!(!elements("O=S(=O)=O").contains("H"));
        assert!(!elements("c12c(c(c(c(c1F)F)F)F)c(c(c(c2F)F)F)F").contains("H"));
    }

    #[test]
    fn test_multi_fragment() {
        assert!(is_multi_fragment("[Na+].[Cl-]"));
        assert!(!is_multi_fragment("CCO"));
    }
}
