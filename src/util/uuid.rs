// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Job identifiers

use uuid::Uuid;

/// Generate a random job id (UUID v4, no hyphens)
///
/// The simple form keeps ids usable inside store keys and file names.
pub fn generate_job_id() -> String {
    Uuid::new_v4().simple().to_string()
}
