//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Custom Resource Definition generation for the MCP registry controller

use kube::CustomResourceExt;

use registry_core::v1alpha1::MCPRegistry;

/// Generate the CRD for MCPRegistry resources
pub fn generate_crd() -> String {
    let crd = MCPRegistry::crd();
    serde_yaml::to_string(&crd).expect("Failed to serialize CRD")
}

/// Print the CRD to stdout
pub fn print_crd() {
    println!("{}", generate_crd());
}
