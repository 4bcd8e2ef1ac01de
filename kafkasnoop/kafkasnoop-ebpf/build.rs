use which::which;

// The eBPF object is linked by `bpf-linker`, which cargo doesn't know about.
// Rebuild whenever the binary on $PATH changes.
fn main() {
    let bpf_linker = which("bpf-linker").unwrap();
    println!("cargo:rerun-if-changed={}", bpf_linker.to_str().unwrap());
}
