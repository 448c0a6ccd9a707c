/*!
 * Protocol layer — data structures, constants and the wire format.
 *
 * Everything related to *what* goes over the wire:
 * - `types` — Event package, Outcome, Attribution, DeepLink
 * - `constants` — defaults, header names, response keys
 * - `request` — POST targets and bodies, attribution queries, `sent_at`
 * - `interpreter` — raw response → `Outcome`
 */

pub mod constants;
pub mod interpreter;
pub mod request;
pub mod types;
