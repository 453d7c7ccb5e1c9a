//! Resource-quantity parsing for the string forms used in manifests.
//!
//! CPU quantities become millicores, memory quantities become bytes.
//! Malformed input parses to zero; the scheduler treats an unparseable
//! request the same as an absent one.

/// Parses a CPU quantity (`"500m"` or `"2"`) into millicores.
pub fn parse_cpu(cpu: &str) -> u64 {
    if let Some(milli) = cpu.strip_suffix('m') {
        milli.parse::<u64>().unwrap_or(0)
    } else {
        (cpu.parse::<f64>().unwrap_or(0.0) * 1000.0) as u64
    }
}

/// Parses a memory quantity (`"64Mi"`, `"1G"`, plain bytes) into bytes.
pub fn parse_memory(memory: &str) -> u64 {
    let memory = memory.to_lowercase();
    let scaled = |suffix: &str, factor: u64| {
        memory
            .strip_suffix(suffix)
            .map(|v| v.parse::<u64>().unwrap_or(0) * factor)
    };
    scaled("ki", 1024)
        .or_else(|| scaled("mi", 1024 * 1024))
        .or_else(|| scaled("gi", 1024 * 1024 * 1024))
        .or_else(|| scaled("k", 1000))
        .or_else(|| scaled("m", 1000 * 1000))
        .or_else(|| scaled("g", 1000 * 1000 * 1000))
        .unwrap_or_else(|| memory.parse::<u64>().unwrap_or(0))
}

/// Formats millicores back into the `"1500m"` manifest form.
pub fn format_milli_cpu(milli: u64) -> String {
    format!("{milli}m")
}
