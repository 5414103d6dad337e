use cleaner_types::*;
use kube::CustomResourceExt;
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/cleaner.projectsveltos.io_cleaners_crd.yaml",
        serde_yaml::to_string(&Cleaner::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/cleaner.projectsveltos.io_reports_crd.yaml",
        serde_yaml::to_string(&Report::crd()).unwrap(),
    )
    .unwrap();
}
