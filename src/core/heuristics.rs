//! Bytecode Heuristics - static danger-signature scan
//!
//! Walks EVM opcodes (skipping PUSH immediates), collects the PUSH4 function
//! selectors a dispatcher compares against, and matches them to known
//! honeypot controls. Lower confidence than a simulation verdict by design of
//! the evidence: a control existing does not mean it is being used.

use alloy_primitives::keccak256;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{CheckKind, CheckResult};

const OP_PUSH1: u8 = 0x60;
const OP_PUSH4: u8 = 0x63;
const OP_PUSH32: u8 = 0x7f;
const OP_DELEGATECALL: u8 = 0xf4;
const OP_SELFDESTRUCT: u8 = 0xff;

/// Confidence of a static pass verdict
pub const HEURISTIC_PASS_CONFIDENCE: f64 = 0.35;
/// Confidence of a static fail verdict
pub const HEURISTIC_FAIL_CONFIDENCE: f64 = 0.5;
/// Scores below this fail even without a blocking pattern
const HEURISTIC_PASS_FLOOR: f64 = 60.0;
/// A static fail never scores above this
const HEURISTIC_FAIL_CAP: f64 = 45.0;

/// Family of a dangerous owner-controlled function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerCategory {
    /// Per-address transfer blocking
    Blacklist,
    /// Owner switch over who may trade and how much
    TransferGate,
    /// Owner-adjustable transfer tax
    FeeControl,
}

impl DangerCategory {
    pub fn penalty(&self) -> f64 {
        match self {
            DangerCategory::Blacklist => 40.0,
            DangerCategory::TransferGate => 25.0,
            DangerCategory::FeeControl => 20.0,
        }
    }

    /// Categories that fail the token on their own
    pub fn is_blocking(&self) -> bool {
        matches!(self, DangerCategory::Blacklist | DangerCategory::TransferGate)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DangerCategory::Blacklist => "transfer blacklist",
            DangerCategory::TransferGate => "owner-only transfer gate",
            DangerCategory::FeeControl => "adjustable fee-on-transfer",
        }
    }
}

const DANGER_SIGNATURES: &[(&str, DangerCategory)] = &[
    ("setBots(address[],bool)", DangerCategory::Blacklist),
    ("blacklist(address)", DangerCategory::Blacklist),
    ("setBlacklist(address,bool)", DangerCategory::Blacklist),
    ("addToBlacklist(address)", DangerCategory::Blacklist),
    ("blacklistAddress(address,bool)", DangerCategory::Blacklist),
    ("addBot(address)", DangerCategory::Blacklist),
    ("addBots(address[])", DangerCategory::Blacklist),
    ("isBot(address)", DangerCategory::Blacklist),
    ("enableTrading()", DangerCategory::TransferGate),
    ("openTrading()", DangerCategory::TransferGate),
    ("setTradingEnabled(bool)", DangerCategory::TransferGate),
    ("pause()", DangerCategory::TransferGate),
    ("setMaxTxAmount(uint256)", DangerCategory::TransferGate),
    ("setMaxWalletSize(uint256)", DangerCategory::TransferGate),
    ("setFee(uint256)", DangerCategory::FeeControl),
    ("setTaxFee(uint256)", DangerCategory::FeeControl),
    ("setSellFee(uint256)", DangerCategory::FeeControl),
    ("setBuyTax(uint256)", DangerCategory::FeeControl),
    ("setSellTax(uint256)", DangerCategory::FeeControl),
    ("setFees(uint256,uint256)", DangerCategory::FeeControl),
];

/// ASCII fragments left by blacklist mappings and revert strings
const ASCII_MARKERS: &[&[u8]] = &[b"blacklist", b"bots"];
const ASCII_MARKER_PENALTY: f64 = 15.0;
const DELEGATECALL_PENALTY: f64 = 15.0;
const SELFDESTRUCT_PENALTY: f64 = 20.0;

lazy_static! {
    static ref DANGER_SELECTORS: HashMap<[u8; 4], (&'static str, DangerCategory)> = DANGER_SIGNATURES
        .iter()
        .map(|(signature, category)| (selector_of(signature), (*signature, *category)))
        .collect();
}

/// 4-byte function selector of a canonical signature
pub fn selector_of(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Drop the trailing CBOR metadata blob solc appends to runtime code
fn strip_metadata(code: &[u8]) -> &[u8] {
    if code.len() < 2 {
        return code;
    }
    let meta_len = u16::from_be_bytes([code[code.len() - 2], code[code.len() - 1]]) as usize;
    let Some(start) = code.len().checked_sub(meta_len + 2) else {
        return code;
    };
    // CBOR map header with 1-3 entries (ipfs/bzzr, solc, experimental)
    match code.get(start) {
        Some(0xa1..=0xa3) => &code[..start],
        _ => code,
    }
}

/// Instruction-level facts gathered in one pass
#[derive(Debug, Default)]
struct OpcodeScan {
    selectors: HashSet<[u8; 4]>,
    delegatecall: bool,
    selfdestruct: bool,
}

fn walk_opcodes(code: &[u8]) -> OpcodeScan {
    let mut scan = OpcodeScan::default();
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        match op {
            OP_PUSH1..=OP_PUSH32 => {
                let width = (op - OP_PUSH1 + 1) as usize;
                if op == OP_PUSH4 {
                    if let Some(imm) = code.get(pc + 1..pc + 5) {
                        scan.selectors.insert([imm[0], imm[1], imm[2], imm[3]]);
                    }
                }
                pc += 1 + width;
                continue;
            }
            OP_DELEGATECALL => scan.delegatecall = true,
            OP_SELFDESTRUCT => scan.selfdestruct = true,
            _ => {}
        }
        pc += 1;
    }
    scan
}

/// PUSH4 immediates in executable code
pub fn collect_selectors(code: &[u8]) -> HashSet<[u8; 4]> {
    walk_opcodes(strip_metadata(code)).selectors
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w.eq_ignore_ascii_case(needle))
}

/// Static verdict from bytecode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicResult {
    pub passed: bool,
    pub score: f64,
    pub categories: BTreeSet<DangerCategory>,
    /// Matched danger signatures, e.g. `setBots(address[],bool)`
    pub matched: Vec<String>,
    pub findings: Vec<String>,
    pub code_size: usize,
}

impl HeuristicResult {
    pub fn confidence(&self) -> f64 {
        if self.passed {
            HEURISTIC_PASS_CONFIDENCE
        } else {
            HEURISTIC_FAIL_CONFIDENCE
        }
    }

    pub fn to_check_result(&self) -> CheckResult {
        let mut evidence = vec!["static bytecode analysis (lower confidence)".to_string()];
        evidence.extend(self.findings.iter().cloned());
        if self.passed {
            CheckResult::pass(CheckKind::Honeypot, self.score, self.confidence(), evidence)
        } else {
            CheckResult::fail(CheckKind::Honeypot, self.score, self.confidence(), evidence)
        }
    }
}

/// Scan deployed bytecode for honeypot controls
pub fn scan_bytecode(code: &[u8]) -> HeuristicResult {
    if code.is_empty() {
        return HeuristicResult {
            passed: false,
            score: 0.0,
            categories: BTreeSet::new(),
            matched: Vec::new(),
            findings: vec!["no contract code".to_string()],
            code_size: 0,
        };
    }

    let executable = strip_metadata(code);
    let scan = walk_opcodes(executable);

    let mut matched: Vec<(&'static str, DangerCategory)> = scan
        .selectors
        .iter()
        .filter_map(|sel| DANGER_SELECTORS.get(sel).copied())
        .collect();
    matched.sort();

    let categories: BTreeSet<DangerCategory> = matched.iter().map(|(_, c)| *c).collect();
    let mut findings = Vec::new();
    let mut penalty = 0.0;

    for category in &categories {
        penalty += category.penalty();
        let names: Vec<&str> = matched
            .iter()
            .filter(|(_, c)| c == category)
            .map(|(s, _)| *s)
            .collect();
        findings.push(format!("{}: {}", category.label(), names.join(", ")));
    }
    if scan.delegatecall {
        penalty += DELEGATECALL_PENALTY;
        findings.push("DELEGATECALL present (logic may be swapped)".to_string());
    }
    if scan.selfdestruct {
        penalty += SELFDESTRUCT_PENALTY;
        findings.push("SELFDESTRUCT present".to_string());
    }
    if ASCII_MARKERS.iter().any(|m| contains(code, m)) {
        penalty += ASCII_MARKER_PENALTY;
        findings.push("blacklist/bots marker strings in bytecode".to_string());
    }

    let raw_score = (100.0 - penalty).max(0.0);
    let blocking = categories.iter().any(|c| c.is_blocking());
    let passed = !blocking && raw_score >= HEURISTIC_PASS_FLOOR;
    let score = if passed {
        raw_score
    } else {
        raw_score.min(HEURISTIC_FAIL_CAP)
    };
    if findings.is_empty() {
        findings.push("no known danger signatures".to_string());
    }

    HeuristicResult {
        passed,
        score,
        categories,
        matched: matched.into_iter().map(|(s, _)| s.to_string()).collect(),
        findings,
        code_size: code.len(),
    }
}
