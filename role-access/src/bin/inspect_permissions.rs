use role_access::config::AccessConfig;
use role_access::logging::init_tracing;
use role_access::service::permission_codec::PermissionCodec;
use role_access::WirePermission;
use std::env;
use std::fs;
use std::io::{self, Read};

fn main() {
    // 設定が不正でもツール自体は動かす
    let log_filter = AccessConfig::from_env()
        .map(|config| config.log_filter)
        .unwrap_or_else(|_| "role_access=warn".to_string());
    init_tracing(&log_filter);

    let args: Vec<String> = env::args().collect();

    let input = if args.len() > 1 {
        // コマンドライン引数のファイルから読み込む
        match fs::read_to_string(&args[1]) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error: cannot read {}: {}", args[1], e);
                std::process::exit(1);
            }
        }
    } else {
        // 標準入力から読み込む
        let mut content = String::new();
        if let Err(e) = io::stdin().read_to_string(&mut content) {
            eprintln!("Error: cannot read stdin: {}", e);
            std::process::exit(1);
        }
        content
    };

    let records: Vec<WirePermission> = match serde_json::from_str(&input) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error: not a wire permission array: {}", e);
            std::process::exit(1);
        }
    };

    let codec = PermissionCodec::default();
    match codec.decode(&records) {
        Ok(nested) => match serde_json::to_string_pretty(&nested) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            let response = e.to_error_response();
            eprintln!("Error: {}", response.message);
            if let Some(errors) = response.errors {
                for error in errors {
                    eprintln!("  - {}", error["message"].as_str().unwrap_or_default());
                }
            }
            eprintln!("Catalog version: {}", codec.catalog().version());
            std::process::exit(1);
        }
    }
}
