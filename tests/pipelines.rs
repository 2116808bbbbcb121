//! End-to-end runs of the three tools on in-memory streams, with small buffers
//! so every stream crosses many buffer exchanges.

use std::error::Error;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use haplotag_rs::codec::Barcode;
use haplotag_rs::errors::HaplotagError;
use haplotag_rs::fastq_tagger::INSERT_LEN;
use haplotag_rs::{bcgen16, sam_haplotag, tenx_spoof};

type TestResult = std::result::Result<(), Box<dyn Error>>;

const SMALL_BUFFER: usize = 64;

const WHITELIST: &str = "AAACCCAAGAAACACT\nAAACCCAAGAAACCAT\n";

const SEGMENTS: &str = "# field\tindex\tsequence\n\
                        A\t1\tTTGGCA\n\
                        A\t2\tCCAAGT\n\
                        A\t5\tGACTGA\n\
                        C\t2\tAACCGGT\n\
                        B\t3\tCATGCA\n\
                        D\t4\tGGAATTC\n";

const QT: &str = "ABCDEFGHIJKLM-NOPQRSTUVWXYZ";

fn write_file(dir: &Path, name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

fn fastq_record(name: &str, comment: &str, seq: &str) -> String {
    format!("@{}{}\n{}\n+\n{}\n", name, comment, seq, "I".repeat(seq.len()))
}

/// The record `fastq_record` builds, after `bases`/`quals` were prepended.
fn tagged_record(name: &str, comment: &str, seq: &str, bases: &str, quals: &str) -> String {
    format!(
        "@{}{}\n{}{}\n+\n{}{}\n",
        name,
        comment,
        bases,
        seq,
        quals,
        "I".repeat(seq.len())
    )
}

fn sentinel_record(name: &str, comment: &str, seq: &str) -> String {
    tagged_record(
        name,
        comment,
        seq,
        &"N".repeat(INSERT_LEN),
        &"#".repeat(INSERT_LEN),
    )
}

fn spoofed_record(name: &str, comment: &str, seq: &str, code: &str) -> String {
    tagged_record(
        name,
        comment,
        seq,
        &format!("{}AAAAAAA", code),
        &"J".repeat(INSERT_LEN),
    )
}

fn tenx_options(dir: &TempDir, clear_log: &str) -> std::io::Result<tenx_spoof::Options> {
    Ok(tenx_spoof::Options {
        prefix: None,
        out_dir: dir.path().to_path_buf(),
        buffer_size: SMALL_BUFFER,
        clear_log: write_file(dir.path(), "clear.tsv", clear_log)?,
        whitelist: write_file(dir.path(), "whitelist.txt", WHITELIST)?,
    })
}

/// A `BC` payload whose A window is `a`; with the segment table above the
/// other windows decode to C02, B03 and D04.
fn bc_with_a(a: &str) -> String {
    format!("AACCGGT{}-TGCATGGAATTCC", a)
}

fn sam_record(name: &str, flag: u32, tags: &str) -> String {
    format!("{}\t{}\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII{}\n", name, flag, tags)
}

fn sam_tags(bc: &str) -> String {
    format!("\tBC:Z:{}\tQT:Z:{}", bc, QT)
}

fn sam_options(dir: &TempDir) -> std::io::Result<sam_haplotag::Options> {
    Ok(sam_haplotag::Options {
        prefix: Some("run1".to_string()),
        out_dir: dir.path().to_path_buf(),
        buffer_size: SMALL_BUFFER,
        segments: write_file(dir.path(), "segments.tsv", SEGMENTS)?,
        command_line: "sam-haplotag run1".to_string(),
    })
}

fn program_line(id: &str, previous: Option<&str>) -> String {
    let previous = previous.map(|p| format!("\tPP:{}", p)).unwrap_or_default();
    format!(
        "@PG\tID:{}\tPN:SamHaplotag{}\tVN:{}\tCL:sam-haplotag run1\n",
        id,
        previous,
        env!("CARGO_PKG_VERSION")
    )
}

#[test]
fn test_tenx_spoof_assigns_by_rank() -> TestResult {
    let dir = TempDir::new()?;
    let options = tenx_options(
        &dir,
        "Barcode\tCorrect Reads\tCorrected Reads\n\
         A01C02B03D04\t10\t2\n\
         A05C06B07D08\t50\t0\n",
    )?;

    let input = [
        fastq_record("r1", " BX:Z:A01C02B03D04", "ACGT"),
        fastq_record("r2", " BX:Z:A05C06B07D08", "GG"),
        fastq_record("r3", "", "TT"),
        fastq_record("r4", " BX:Z:A09C09B09D09", "C"),
    ]
    .concat();
    let (summary, output) = tenx_spoof::run(&options, Cursor::new(input.clone()), Vec::new())?;

    let expected = [
        spoofed_record("r1", " BX:Z:A01C02B03D04", "ACGT", "AAACCCAAGAAACCAT"),
        spoofed_record("r2", " BX:Z:A05C06B07D08", "GG", "AAACCCAAGAAACACT"),
        sentinel_record("r3", "", "TT"),
        sentinel_record("r4", " BX:Z:A09C09B09D09", "C"),
    ]
    .concat();
    assert_eq!(String::from_utf8(output)?, expected);
    assert_eq!(expected.len(), input.len() + 4 * 2 * INSERT_LEN);

    assert_eq!(summary.reads.total_reads, 4);
    assert_eq!(summary.reads.bc_added, 2);
    assert_eq!(summary.reads.missing_tags, 1);
    assert_eq!(summary.reads.unmapped, 1);
    assert_eq!(summary.clear_barcodes, 2);
    assert_eq!(summary.assigned, 2);
    assert_eq!(summary.discarded, 0);

    assert_eq!(
        fs::read_to_string(&summary.log_path)?,
        "HaploTag\t10x\n\
         A05C06B07D08\tAAACCCAAGAAACACT\n\
         A01C02B03D04\tAAACCCAAGAAACCAT\n"
    );
    Ok(())
}

#[test]
fn test_tenx_spoof_discards_beyond_whitelist() -> TestResult {
    let dir = TempDir::new()?;
    let options = tenx_options(
        &dir,
        "Barcode\tCorrect Reads\tCorrected Reads\n\
         A01C01B01D01\t3\t0\n\
         A02C02B02D02\t1\t0\n\
         A03C03B03D03\t2\t2\n",
    )?;

    let input = [
        fastq_record("low", " BX:Z:A02C02B02D02", "A"),
        fastq_record("top", " BX:Z:A03C03B03D03", "C"),
    ]
    .concat();
    let (summary, output) = tenx_spoof::run(&options, Cursor::new(input), Vec::new())?;

    let expected = [
        sentinel_record("low", " BX:Z:A02C02B02D02", "A"),
        spoofed_record("top", " BX:Z:A03C03B03D03", "C", "AAACCCAAGAAACACT"),
    ]
    .concat();
    assert_eq!(String::from_utf8(output)?, expected);
    assert_eq!(summary.clear_barcodes, 3);
    assert_eq!(summary.assigned, 2);
    assert_eq!(summary.discarded, 1);
    assert_eq!(summary.reads.unmapped, 1);
    Ok(())
}

#[test]
fn test_tenx_spoof_skips_barcodes_without_reads() -> TestResult {
    let dir = TempDir::new()?;
    let options = tenx_options(
        &dir,
        "Barcode\tCorrect Reads\tCorrected Reads\n\
         A09C09B09D09\t0\t0\n\
         A01C02B03D04\t4\t1\n",
    )?;

    let input = [
        fastq_record("r1", " BX:Z:A09C09B09D09", "A"),
        fastq_record("r2", " BX:Z:A01C02B03D04", "C"),
    ]
    .concat();
    let (summary, output) = tenx_spoof::run(&options, Cursor::new(input), Vec::new())?;

    let expected = [
        sentinel_record("r1", " BX:Z:A09C09B09D09", "A"),
        spoofed_record("r2", " BX:Z:A01C02B03D04", "C", "AAACCCAAGAAACACT"),
    ]
    .concat();
    assert_eq!(String::from_utf8(output)?, expected);
    assert_eq!(summary.clear_barcodes, 2);
    assert_eq!(summary.assigned, 1);
    assert_eq!(summary.discarded, 1);
    assert_eq!(summary.reads.unmapped, 1);
    assert_eq!(
        fs::read_to_string(&summary.log_path)?,
        "HaploTag\t10x\nA01C02B03D04\tAAACCCAAGAAACACT\n"
    );
    Ok(())
}

#[test]
fn test_tenx_spoof_counts_unterminated_last_read() -> TestResult {
    let dir = TempDir::new()?;
    let options = tenx_options(
        &dir,
        "Barcode\tCorrect Reads\tCorrected Reads\nA01C02B03D04\t2\t0\n",
    )?;

    let record = fastq_record("r1", " BX:Z:A01C02B03D04", "ACGT");
    let input = record.trim_end().to_string();
    let (summary, output) = tenx_spoof::run(&options, Cursor::new(input), Vec::new())?;

    let expected = spoofed_record("r1", " BX:Z:A01C02B03D04", "ACGT", "AAACCCAAGAAACACT");
    assert_eq!(String::from_utf8(output)?, expected.trim_end());
    assert_eq!(summary.reads.total_reads, 1);
    assert_eq!(summary.reads.bc_added, 1);
    Ok(())
}

#[test]
fn test_tenx_spoof_rejects_malformed_clear_log() -> TestResult {
    let dir = TempDir::new()?;
    let options = tenx_options(
        &dir,
        "Barcode\tCorrect Reads\tCorrected Reads\nA01C02B03D04\tmany\t0\n",
    )?;
    let result = tenx_spoof::run(&options, Cursor::new(Vec::new()), Vec::new());
    assert!(matches!(result, Err(HaplotagError::ClearLog { line: 2, .. })));
    Ok(())
}

#[test]
fn test_tenx_spoof_missing_whitelist() -> TestResult {
    let dir = TempDir::new()?;
    let mut options = tenx_options(&dir, "Barcode\tCorrect Reads\tCorrected Reads\n")?;
    options.whitelist = dir.path().join("absent.txt");
    let result = tenx_spoof::run(&options, Cursor::new(Vec::new()), Vec::new());
    assert!(matches!(result, Err(HaplotagError::Open { .. })));
    Ok(())
}

#[test]
fn test_bcgen16_prepends_raw_code_and_logs_distinct() -> TestResult {
    let dir = TempDir::new()?;
    let options = bcgen16::Options {
        prefix: Some("lane1".to_string()),
        out_dir: dir.path().to_path_buf(),
        buffer_size: SMALL_BUFFER,
    };

    let high = Barcode::from_fields(5, 6, 7, 8);
    let low = Barcode::from_fields(1, 2, 3, 4);
    let input = [
        fastq_record("r1", " BX:Z:A05C06B07D08", "ACGTACGT"),
        fastq_record("r2", "\tBX:Z:A01C02B03D04\tRG:Z:x", "TTTT"),
        fastq_record("r3", " BX:Z:A05C06B07D08", "G"),
        fastq_record("r4", " BX:Z:A00C02B03D04", "GG"),
    ]
    .concat();
    let code = |b: Barcode| String::from_utf8(b.to_16base().to_vec());

    let (summary, output) = bcgen16::run(&options, Cursor::new(input.clone()), Vec::new())?;
    let expected = [
        spoofed_record("r1", " BX:Z:A05C06B07D08", "ACGTACGT", &code(high)?),
        spoofed_record("r2", "\tBX:Z:A01C02B03D04\tRG:Z:x", "TTTT", &code(low)?),
        spoofed_record("r3", " BX:Z:A05C06B07D08", "G", &code(high)?),
        sentinel_record("r4", " BX:Z:A00C02B03D04", "GG"),
    ]
    .concat();
    assert_eq!(String::from_utf8(output)?, expected);
    assert_eq!(summary.reads.total_reads, 4);
    assert_eq!(summary.reads.bc_added, 3);
    assert_eq!(summary.reads.missing_tags, 1);
    assert_eq!(summary.distinct_barcodes, 2);
    assert_eq!(summary.log_path, dir.path().join("lane1_HaploTag_to_16BaseBCs"));

    let log = fs::read_to_string(&summary.log_path)?;
    assert_eq!(
        log,
        format!(
            "HaploTag\t16 Base BC\nA01C02B03D04\t{}\nA05C06B07D08\t{}\n",
            code(low)?,
            code(high)?
        )
    );

    // a second run over the same input rewrites identical output and log
    let (_, again) = bcgen16::run(&options, Cursor::new(input), Vec::new())?;
    assert_eq!(String::from_utf8(again)?, expected);
    assert_eq!(fs::read_to_string(&summary.log_path)?, log);
    Ok(())
}

#[test]
fn test_bcgen16_counts_unterminated_last_read() -> TestResult {
    let dir = TempDir::new()?;
    let options = bcgen16::Options {
        prefix: None,
        out_dir: dir.path().to_path_buf(),
        buffer_size: SMALL_BUFFER,
    };

    let input = [
        fastq_record("r1", " BX:Z:A01C02B03D04", "ACGT"),
        fastq_record("r2", " BX:Z:A05C06B07D08", "TT").trim_end().to_string(),
    ]
    .concat();
    let (summary, output) = bcgen16::run(&options, Cursor::new(input.clone()), Vec::new())?;

    assert_eq!(output.len(), input.len() + 2 * 2 * INSERT_LEN);
    assert!(output.ends_with(b"II"));
    assert_eq!(summary.reads.total_reads, 2);
    assert_eq!(summary.reads.bc_added, 2);
    assert_eq!(summary.distinct_barcodes, 2);
    Ok(())
}

#[test]
fn test_bcgen16_empty_input() -> TestResult {
    let dir = TempDir::new()?;
    let options = bcgen16::Options {
        prefix: None,
        out_dir: dir.path().to_path_buf(),
        buffer_size: SMALL_BUFFER,
    };
    let (summary, output) = bcgen16::run(&options, Cursor::new(Vec::new()), Vec::new())?;
    assert!(output.is_empty());
    assert_eq!(summary.reads.total_reads, 0);
    assert_eq!(
        fs::read_to_string(&summary.log_path)?,
        "HaploTag\t16 Base BC\n"
    );
    Ok(())
}

#[test]
fn test_sam_haplotag_tags_and_logs() -> TestResult {
    let dir = TempDir::new()?;
    let options = sam_options(&dir)?;

    let exact = bc_with_a("TTGGCA");
    let corrected = bc_with_a("TTGGCT");
    let unclear = format!("GGGGGGGTTGGCA{}", &exact[13..]);
    let header = "@HD\tVN:1.6\n@PG\tID:bwa\tPN:bwa\n";
    let input = [
        header.to_string(),
        sam_record("r1", 77, &sam_tags(&exact)),
        sam_record("r1", 141, &sam_tags(&exact)),
        sam_record("r2", 77, &sam_tags(&corrected)),
        sam_record("r3", 77, &sam_tags(&unclear)),
        sam_record("r4", 77, ""),
    ]
    .concat();

    let (summary, output) = sam_haplotag::run(&options, Cursor::new(input), Vec::new())?;

    let qx = "\tQX:Z:ABCDEFGHIJKLM+ZYXWVUTSRQPON";
    let expected = [
        header.to_string(),
        program_line("SamHaplotag", Some("bwa")),
        sam_record(
            "r1",
            77,
            &format!(
                "{}\tRX:Z:AACCGGTTTGGCA+GGAATTCCATGCA{}\tBX:Z:A01C02B03D04",
                sam_tags(&exact),
                qx
            ),
        ),
        sam_record("r1", 141, &sam_tags(&exact)),
        sam_record(
            "r2",
            77,
            &format!(
                "{}\tRX:Z:AACCGGTTTGGCT+GGAATTCCATGCA{}\tBX:Z:A01C02B03D04",
                sam_tags(&corrected),
                qx
            ),
        ),
        sam_record(
            "r3",
            77,
            &format!(
                "{}\tRX:Z:GGGGGGGTTGGCA+GGAATTCCATGCA{}\tBX:Z:A01C00B03D04",
                sam_tags(&unclear),
                qx
            ),
        ),
        sam_record("r4", 77, ""),
    ]
    .concat();
    assert_eq!(String::from_utf8(output)?, expected);

    assert_eq!(summary.reads.total_reads, 5);
    assert_eq!(summary.reads.first_of_pair, 4);
    assert_eq!(summary.reads.tagged, 3);
    assert_eq!(summary.reads.missing_tags, 1);
    assert_eq!(summary.clear_barcodes, 1);
    assert_eq!(summary.unclear_barcodes, 1);

    assert_eq!(summary.clear_log, dir.path().join("run1_SamHaplotag_Clear_BC"));
    assert_eq!(
        fs::read_to_string(&summary.clear_log)?,
        "Barcode\tCorrect Reads\tCorrected Reads\nA01C02B03D04\t1\t1\n"
    );
    assert_eq!(
        fs::read_to_string(&summary.unclear_log)?,
        "Barcode\tReads\nA01C00B03D04\t1\n"
    );
    assert_eq!(fs::read_to_string(&summary.missing_log)?, "Read\nr4\n");
    Ok(())
}

#[test]
fn test_sam_haplotag_orders_logs_by_reads() -> TestResult {
    let dir = TempDir::new()?;
    let options = sam_options(&dir)?;

    let mut records = Vec::new();
    for (a, copies) in [("CCAAGT", 3), ("GACTGA", 5), ("TTGGCA", 3)] {
        for n in 0..copies {
            records.push(sam_record(&format!("{}{}", a, n), 77, &sam_tags(&bc_with_a(a))));
        }
    }
    let (summary, _) = sam_haplotag::run(&options, Cursor::new(records.concat()), Vec::new())?;

    assert_eq!(
        fs::read_to_string(&summary.clear_log)?,
        "Barcode\tCorrect Reads\tCorrected Reads\n\
         A05C02B03D04\t5\t0\n\
         A01C02B03D04\t3\t0\n\
         A02C02B03D04\t3\t0\n"
    );
    assert_eq!(summary.reads.tagged, 11);
    Ok(())
}

#[test]
fn test_sam_haplotag_tags_unterminated_last_record() -> TestResult {
    let dir = TempDir::new()?;
    let options = sam_options(&dir)?;

    let tags = sam_tags(&bc_with_a("TTGGCA"));
    let input = [
        sam_record("r1", 77, &tags),
        sam_record("r2", 77, &tags).trim_end().to_string(),
    ]
    .concat();
    let (summary, output) = sam_haplotag::run(&options, Cursor::new(input), Vec::new())?;

    let output = String::from_utf8(output)?;
    assert!(output.ends_with("\tBX:Z:A01C02B03D04"));
    assert_eq!(output.matches("\tBX:Z:A01C02B03D04").count(), 2);
    assert_eq!(summary.reads.total_reads, 2);
    assert_eq!(summary.reads.first_of_pair, 2);
    assert_eq!(summary.reads.tagged, 2);
    assert_eq!(
        fs::read_to_string(&summary.clear_log)?,
        "Barcode\tCorrect Reads\tCorrected Reads\nA01C02B03D04\t2\t0\n"
    );
    Ok(())
}

#[test]
fn test_sam_haplotag_header_only() -> TestResult {
    let dir = TempDir::new()?;
    let options = sam_options(&dir)?;

    let input = "@HD\tVN:1.6\n@PG\tID:SamHaplotag\tPN:SamHaplotag\n@CO\tno newline";
    let (summary, output) = sam_haplotag::run(&options, Cursor::new(input), Vec::new())?;

    let expected = format!(
        "{}\n{}",
        input,
        program_line("SamHaplotag.1", Some("SamHaplotag"))
    );
    assert_eq!(String::from_utf8(output)?, expected);
    assert_eq!(summary.reads.total_reads, 0);
    assert_eq!(fs::read_to_string(&summary.missing_log)?, "Read\n");
    Ok(())
}

#[test]
fn test_sam_haplotag_clear_log_feeds_tenx_spoof() -> TestResult {
    let dir = TempDir::new()?;
    let options = sam_options(&dir)?;

    let input = [
        sam_record("a", 77, &sam_tags(&bc_with_a("TTGGCA"))),
        sam_record("b", 77, &sam_tags(&bc_with_a("GACTGA"))),
        sam_record("c", 77, &sam_tags(&bc_with_a("GACTGA"))),
    ]
    .concat();
    let (summary, _) = sam_haplotag::run(&options, Cursor::new(input), Vec::new())?;

    let spoof = tenx_spoof::Options {
        prefix: Some("run1".to_string()),
        out_dir: dir.path().to_path_buf(),
        buffer_size: SMALL_BUFFER,
        clear_log: summary.clear_log,
        whitelist: write_file(dir.path(), "whitelist.txt", WHITELIST)?,
    };
    let fastq = fastq_record("a", " BX:Z:A01C02B03D04", "ACGT");
    let (spoofed, output) = tenx_spoof::run(&spoof, Cursor::new(fastq), Vec::new())?;

    assert_eq!(spoofed.clear_barcodes, 2);
    assert_eq!(
        String::from_utf8(output)?,
        spoofed_record("a", " BX:Z:A01C02B03D04", "ACGT", "AAACCCAAGAAACCAT")
    );
    Ok(())
}
