//! # nitro-attest CLI
//!
//! Attestation Documentをファイルから読み込んで検証し、結果をJSONで標準出力に書く。
//! ログは標準エラー出力（`RUST_LOG` で制御、デフォルト `info`）。
//!
//! ## サブコマンド
//! - `verify`: 設定とフラグで指定したポリシーで検証
//! - `inspect`: 全受理ポリシーで検証し、抽出した6スロットのPCRを含む検証結果を表示
//!
//! 設定は `VerifierConfig::from_env()`（`NITRO_ATTEST_*`）を基にフラグで上書きする。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use nitro_attest::{
    AnyPcrs, AnyTimestamp, AttestationVerifier, ChainVerification, ExpectedPcrs, FixedClock,
    MaxAge, Pcr, VerifiedAttestation, VerifierConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attestation Documentを検証する
    Verify {
        /// Attestation Documentのファイル
        file: PathBuf,
        #[command(flatten)]
        input: InputArgs,
        /// 許容する最大経過秒数（指定しない場合はタイムスタンプを検査しない）
        #[arg(long)]
        max_age_secs: Option<u64>,
        /// 期待するPCR値（`INDEX=HEX`、複数指定可）
        #[arg(long = "expect-pcr", value_parser = parse_expected_pcr)]
        expect_pcr: Vec<(u8, Pcr)>,
    },
    /// 全受理ポリシーで検証し、抽出した6スロット（PCR0〜4, 8）を含む検証結果を表示する
    Inspect {
        /// Attestation Documentのファイル
        file: PathBuf,
        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// ファイルのエンコーディング
    #[arg(long, value_enum, default_value_t = Format::Raw)]
    format: Format,
    /// 証明書チェーンの署名まで検証する
    #[arg(long)]
    full_chain: bool,
    /// 現在時刻（Unix秒）を固定する
    #[arg(long)]
    now: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Raw,
    Hex,
    Base64,
}

/// `INDEX=HEX` 形式のPCR期待値をパースする。
fn parse_expected_pcr(arg: &str) -> Result<(u8, Pcr), String> {
    let (index, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("INDEX=HEX 形式ではありません: {arg}"))?;
    let index: u8 = index
        .trim()
        .parse()
        .map_err(|e| format!("PCRインデックスが不正です: {e}"))?;
    let bytes = hex::decode(value.trim()).map_err(|e| format!("PCR値が16進数ではありません: {e}"))?;
    let pcr: Pcr = bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("PCR値は48バイトである必要があります（{}バイト）", b.len()))?;
    Ok((index, pcr))
}

fn decode_document(raw: Vec<u8>, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Raw => Ok(raw),
        Format::Hex => {
            let text = String::from_utf8(raw).context("16進数ファイルがUTF-8ではありません")?;
            hex::decode(text.trim()).context("16進数のデコードに失敗")
        }
        Format::Base64 => {
            let text = String::from_utf8(raw).context("Base64ファイルがUTF-8ではありません")?;
            base64::engine::general_purpose::STANDARD
                .decode(text.trim())
                .context("Base64のデコードに失敗")
        }
    }
}

fn read_document(file: &Path, format: Format) -> Result<Vec<u8>> {
    let raw = std::fs::read(file)
        .with_context(|| format!("{} を読み込めません", file.display()))?;
    decode_document(raw, format)
}

fn build_verifier(input: &InputArgs) -> Result<AttestationVerifier> {
    let mut config = VerifierConfig::from_env().context("設定の読み込みに失敗")?;
    if input.full_chain {
        config.chain_verification = ChainVerification::Full;
    }
    let verifier = AttestationVerifier::new(config);
    Ok(match input.now {
        Some(now) => verifier.with_clock(FixedClock(now)),
        None => verifier,
    })
}

/// `inspect` の出力。抽出した6スロットをインデックス付きで並べる。
#[derive(serde::Serialize)]
struct Inspection<'a> {
    #[serde(flatten)]
    attestation: &'a VerifiedAttestation,
    pcr_map: std::collections::BTreeMap<u8, String>,
    chain_verification: &'static str,
}

impl<'a> Inspection<'a> {
    fn new(attestation: &'a VerifiedAttestation, mode: ChainVerification) -> Self {
        let chain_verification = match mode {
            ChainVerification::IdentityLinkage => "identity_linkage",
            ChainVerification::Full => "full",
        };
        Self {
            attestation,
            pcr_map: attestation
                .pcrs
                .to_map()
                .into_iter()
                .map(|(i, v)| (i, hex::encode(v)))
                .collect(),
            chain_verification,
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Verify {
            file,
            input,
            max_age_secs,
            expect_pcr,
        } => {
            let document = read_document(&file, input.format)?;
            let mut verifier = build_verifier(&input)?;
            if let Some(secs) = max_age_secs {
                verifier = verifier.with_timestamp_policy(MaxAge {
                    max_age_ms: secs.saturating_mul(1000),
                    max_skew_ms: 0,
                });
            }
            if !expect_pcr.is_empty() {
                let expected = expect_pcr
                    .into_iter()
                    .fold(ExpectedPcrs::new(), |acc, (i, v)| acc.with(i, v));
                verifier = verifier.with_pcr_policy(expected);
            }

            let verified = verifier
                .verify(&document)
                .with_context(|| format!("{} の検証に失敗", file.display()))?;
            tracing::info!(module_id = %verified.module_id, "検証に成功しました");
            println!("{}", serde_json::to_string_pretty(&verified)?);
        }
        Command::Inspect { file, input } => {
            let document = read_document(&file, input.format)?;
            let verifier = build_verifier(&input)?;
            let verified = verifier
                .verify_with(&document, &AnyTimestamp, &AnyPcrs)
                .with_context(|| format!("{} のデコードに失敗", file.display()))?;
            let inspection = Inspection::new(&verified, verifier.config().chain_verification);
            println!("{}", serde_json::to_string_pretty(&inspection)?);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse())
}
