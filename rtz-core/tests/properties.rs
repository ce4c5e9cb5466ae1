mod common;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use common::*;
use rtz_core::error::ContainerError;
use rtz_core::model::block::Padding;
use rtz_core::model::entry::EntryStatus;
use rtz_core::model::project::{BlockTable, ContainerProfile, ScanRegion};
use rtz_core::model::report::{PatchOutcome, Stage};
use rtz_core::model::token::{canonicalize, trim_terminators, Charset, Token};
use rtz_core::parsers::markup;
use rtz_core::services::codec::{codecs, Codec};
use rtz_core::services::ledger::Ledger;
use rtz_core::services::locator::{assert_disjoint, Layout, Locator};
use rtz_core::services::pipeline::{inject, with_terminator, CancelToken};
use rtz_core::services::verify::verify;

const SEED: u64 = 0x5EED_0A7C;

fn alphabet(charset: Charset) -> Vec<char> {
    let mut chars: Vec<char> = "abcXYZ 019!?.,<>{}$\t".chars().collect();
    match charset {
        Charset::ShiftJis => chars.extend("アタックガード先導者ヴァンー！「」".chars()),
        Charset::Utf16Le => chars.extend("アタック先導者éß😀".chars()),
        Charset::Windows1252 => chars.extend("éèçœ€ß".chars()),
    }
    chars
}

fn text(rng: &mut StdRng, chars: &[char], max: usize) -> String {
    let len = rng.gen_range(1..=max);
    (0..len).map(|_| *chars.choose(rng).unwrap()).collect()
}

fn ruby_part_ok(t: &str) -> bool {
    !t.contains("{$") && !t.ends_with('<')
}

fn raw_tokens(rng: &mut StdRng, charset: Charset) -> Vec<Token> {
    let chars = alphabet(charset);
    let mut out = Vec::new();
    for _ in 0..rng.gen_range(0..8) {
        let token = match rng.gen_range(0..6) {
            0 | 1 => Token::literal(text(rng, &chars, 6), charset),
            2 => {
                let (base, reading) = (text(rng, &chars, 3), text(rng, &chars, 4));
                if !ruby_part_ok(&base) || !ruby_part_ok(&reading) || reading.starts_with('>') {
                    continue;
                }
                Token::ruby(base, reading)
            }
            3 => Token::color(rng.gen_range(0..=0xFF_FFFF)),
            4 => Token::ColorReset,
            _ => Token::LineBreak,
        };
        out.push(token);
    }
    if rng.gen_bool(0.5) {
        out.push(Token::Terminator);
    }
    out
}

/// Random canonical sequence that the codec can express. Merging adjacent
/// literals can form a color opener, so such draws are retried.
fn tokens(rng: &mut StdRng, charset: Charset) -> Vec<Token> {
    loop {
        let t = canonicalize(raw_tokens(rng, charset));
        let expressible = t
            .iter()
            .all(|t| !matches!(t, Token::Literal { text, .. } if text.contains("{$")));
        if expressible {
            return t;
        }
    }
}

#[test]
fn decode_inverts_encode() {
    let mut rng = StdRng::seed_from_u64(SEED);
    for charset in [Charset::ShiftJis, Charset::Utf16Le, Charset::Windows1252] {
        let codec = Codec::new(charset);
        for _ in 0..500 {
            let t = tokens(&mut rng, charset);
            let bytes = codec.encode(&t).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), t, "{charset}: {bytes:02X?}");
        }
    }
}

#[test]
fn markup_printer_inverts_parser() {
    let mut rng = StdRng::seed_from_u64(SEED + 1);
    for _ in 0..500 {
        let t = tokens(&mut rng, Charset::ShiftJis);
        let printed = markup::print(&t);
        assert_eq!(markup::parse(&printed, Charset::ShiftJis).unwrap(), t, "{printed}");
    }
}

#[test]
fn scanned_blocks_never_overlap() {
    let mut rng = StdRng::seed_from_u64(SEED + 2);
    for unit in [1usize, 2] {
        for _ in 0..300 {
            let len = rng.gen_range(0..96) * unit;
            let blob: Vec<u8> = (0..len).map(|_| *[0u8, 0, b'a', b'b'].choose(&mut rng).unwrap()).collect();
            let locator = Locator::new(Layout::Scan(ScanRegion::default()), Padding::repeated(0, unit));
            let blocks = locator.locate(&blob).unwrap();

            assert!(assert_disjoint(&blocks).is_ok());
            for b in &blocks {
                assert!(b.end() <= blob.len());
                assert!(b.allocated_length > 0);
                assert_eq!(b.offset % unit, 0);
            }
        }
    }
}

#[test]
fn table_layouts_are_disjoint_or_refused() {
    let mut rng = StdRng::seed_from_u64(SEED + 3);
    for _ in 0..300 {
        let count = rng.gen_range(1..6usize);
        let header = 4 + 8 * count;
        let body = 64usize;
        let records: Vec<(u32, u32)> = (0..count)
            .map(|_| {
                let offset = header + rng.gen_range(0..body - 1);
                let len = rng.gen_range(1..=(header + body - offset).min(16));
                (offset as u32, len as u32)
            })
            .collect();

        let mut blob = Vec::with_capacity(header + body);
        blob.extend_from_slice(&(count as u32).to_le_bytes());
        for (o, l) in &records {
            blob.extend_from_slice(&o.to_le_bytes());
            blob.extend_from_slice(&l.to_le_bytes());
        }
        blob.resize(header + body, b'x');

        let mut sorted = records.clone();
        sorted.sort_unstable();
        let overlapping = sorted.windows(2).any(|w| w[0].0 + w[0].1 > w[1].0);

        let locator = Locator::new(Layout::Table(BlockTable { offset: 0, count: None }), Padding::repeated(0, 1));
        match locator.locate(&blob) {
            Ok(blocks) => {
                assert!(!overlapping);
                assert!(assert_disjoint(&blocks).is_ok());
                assert_eq!(blocks.len(), count);
            }
            Err(e) => {
                assert!(overlapping, "unexpected {e:?}");
                assert!(matches!(e, ContainerError::Overlap { .. }));
            }
        }
    }
}

fn sources(charset: Charset) -> &'static [&'static str] {
    match charset {
        Charset::Windows1252 => &["Attaque\\0", "Garde\\0", "Pioche\\0", "<|Avant-garde|vanguard|>!\\0", "{$336600}Monte{$}\\0"],
        _ => &["アタック\\0", "ガード\\0", "ドロー\\0", "<|先導者|ヴァンガード|>です\\0", "{$336600}ライド{$}\\0"],
    }
}

/// A container of random layout, charsets and fill with a partly translated
/// ledger. Every source string is terminated.
fn random_run(rng: &mut StdRng) -> (Fixture, Ledger) {
    let charsets = [SJ, U, W];
    let source = *charsets.choose(rng).unwrap();
    let target = *charsets.choose(rng).unwrap();
    let fill = *[Fill::Byte(0), Fill::Byte(0x20), Fill::Char(' ')].choose(rng).unwrap();
    let shape = *[Shape::Table, Shape::Segments].choose(rng).unwrap();

    let strings: Vec<(&str, usize)> = (0..rng.gen_range(1..8))
        .map(|_| (*sources(source).choose(rng).unwrap(), rng.gen_range(0..6)))
        .collect();
    let fx = build(&strings, source, target, fill, shape);
    let mut ledger = fx.ledger();

    // "Fête" has no Shift_JIS form
    let targets = ["Attack", "Guard!", "Draw", "Fête", "Stand up, my vanguard", "Ride\\nthe vanguard", "{$FF0000}Go{$}"];
    let statuses = [
        EntryStatus::Untranslated,
        EntryStatus::InProgress,
        EntryStatus::Completed,
        EntryStatus::NeedsReview,
    ];
    for id in fx.ids.clone() {
        let status = *statuses.choose(rng).unwrap();
        if status == EntryStatus::Untranslated {
            continue;
        }
        let t = *targets.choose(rng).unwrap();
        ledger.assign(id, target_in(t, target), status).unwrap();
    }
    (fx, ledger)
}

#[test]
fn injection_is_deterministic_and_size_safe() {
    let mut rng = StdRng::seed_from_u64(SEED + 4);
    for _ in 0..300 {
        let (fx, ledger) = random_run(&mut rng);
        let mut profile = fx.profile.clone();
        profile.allow_truncation = rng.gen_bool(0.5);
        let setup = format!(
            "{} -> {}, pad {:?}/{:?}, table {}",
            profile.source_charset,
            profile.target_charset,
            profile.pad_byte,
            profile.pad_char,
            profile.table.is_some()
        );

        let first = inject(&fx.blob, &ledger, &profile, &CancelToken::new()).unwrap();
        let second = inject(&fx.blob, &ledger, &profile, &CancelToken::new()).unwrap();
        let sequential = inject(
            &fx.blob,
            &ledger,
            &ContainerProfile {
                parallel: false,
                ..profile.clone()
            },
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(first.output, second.output, "{setup}");
        assert_eq!(first.output, sequential.output, "{setup}");
        assert_eq!(first.report.output_sha256, second.report.output_sha256);
        assert_eq!(first.output.len(), fx.blob.len());

        let (_, codec) = codecs(&profile).unwrap();
        for r in &first.report.results {
            let slot = &first.output[r.offset..r.offset + r.allocated_length];
            let index = fx.ids.iter().position(|id| *id == r.entry_id).unwrap();
            match r.outcome {
                PatchOutcome::Fits => {
                    let target = &ledger.get(r.entry_id).unwrap().target_tokens;
                    let mut expected = codec.encode(&with_terminator(target, true)).unwrap();
                    codec.padding().fill(&mut expected, r.allocated_length);
                    assert_eq!(slot, &expected[..], "{setup}");
                    assert_eq!(r.stage, Stage::Written);
                }
                PatchOutcome::Truncated => {
                    assert!(!r.dropped.is_empty());
                    assert_eq!(r.stage, Stage::Written);
                }
                PatchOutcome::Rejected => {
                    assert_eq!(slot, &fx.block(&fx.blob, index)[..], "{setup}");
                    assert!(r.failed_at.is_some());
                }
            }
        }

        let found = verify(&first.output, &ledger, &profile).unwrap();
        assert!(found.is_empty(), "{setup}: {found:?}");
    }
}

#[test]
fn entries_that_are_not_completed_keep_their_source() {
    let mut rng = StdRng::seed_from_u64(SEED + 5);
    for _ in 0..100 {
        let (fx, ledger) = random_run(&mut rng);
        let (source, _) = codecs(&fx.profile).unwrap();
        let run = inject(&fx.blob, &ledger, &fx.profile, &CancelToken::new()).unwrap();

        for (index, id) in fx.ids.iter().enumerate() {
            let entry = ledger.get(*id).unwrap();
            if entry.status == EntryStatus::Completed {
                continue;
            }
            let decoded = source.decode_slot(&fx.block(&run.output, index)).unwrap();
            assert_eq!(trim_terminators(&decoded), trim_terminators(&entry.source_tokens));
        }
    }
}
