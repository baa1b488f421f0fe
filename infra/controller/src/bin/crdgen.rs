//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Prints the MCPRegistry CRD as YAML

fn main() {
    toolhive_controller::crd::print_crd();
}
