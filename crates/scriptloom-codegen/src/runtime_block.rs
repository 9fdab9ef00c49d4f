//! The shared runtime support block
//!
//! Appended once, verbatim, to every bundle. The text is identical across
//! all compiles and is golden-tested on its own. The Rust rendition of the
//! same semantics lives in `scriptloom-runtime`; the two must stay in
//! lockstep (delay resolution order, alias tables, seal labels, registry
//! document keys).

/// The runtime support block embedded in every generated bundle
pub const RUNTIME_BLOCK: &str = r#"// ---------------------------------------------------------------------------
// Scriptloom shared runtime. Generated code above this line calls into it;
// nothing below is workflow-specific.
// ---------------------------------------------------------------------------

var __SEAL_PREFIX = 'slt1:';
var __SEAL_VERSION = 1;
var __SEAL_STREAM_LABEL = 'scriptloom/seal/stream/v1';
var __SEAL_META_LABEL = 'scriptloom/seal/meta/v1';
var __SECRET_EXPORT_KEY = '__secret_export_v1';
var __TRIGGER_REGISTRY_KEY = '__trigger_registry_v1';

var __SECRET_ALIASES = {
  slack: ['SLACK_BOT_TOKEN', 'SLACK_TOKEN', 'SLACK_OAUTH_TOKEN'],
  shopify: ['SHOPIFY_ADMIN_TOKEN', 'SHOPIFY_ACCESS_TOKEN', 'SHOPIFY_API_PASSWORD'],
  stripe: ['STRIPE_SECRET_KEY', 'STRIPE_API_KEY']
};

function __log(level, event, details) {
  var entry = {
    level: level,
    event: event,
    details: details || {},
    timestamp: new Date().toISOString()
  };
  console.log(JSON.stringify(entry));
}

function __lookupPath(obj, path) {
  var parts = String(path).split('.');
  var current = obj;
  for (var i = 0; i < parts.length; i++) {
    if (current === null || current === undefined) { return undefined; }
    current = current[parts[i]];
  }
  return current;
}

function __interpolate(template, ctx) {
  return String(template).replace(/\{\{\s*([^{}]+?)\s*\}\}/g, function (m, path) {
    var value = __lookupPath(ctx, path);
    if (value === null || value === undefined) { return ''; }
    if (typeof value === 'object') { return JSON.stringify(value); }
    return String(value);
  });
}

function __validationError(step, field, message) {
  var err = new Error('validation failed in step ' + step + ', field ' + field + ': ' + message);
  err.name = 'ValidationError';
  err.step = step;
  err.field = field;
  return err;
}

function __headerValue(headers, name) {
  var lower = String(name).toLowerCase();
  for (var key in headers) {
    if (String(key).toLowerCase() === lower) { return headers[key]; }
  }
  return null;
}

// Accepts integer seconds, epoch-seconds, epoch-milliseconds, or an HTTP
// date; returns a millisecond offset from now, floored at zero.
function __parseRetryAfterMs(value) {
  if (value === null || value === undefined) { return null; }
  var text = String(value).trim();
  if (text === '') { return null; }
  if (/^[0-9]+$/.test(text)) {
    var n = parseInt(text, 10);
    if (n < 10000000) { return n * 1000; }
    var nowMs = Date.now();
    if (n >= 100000000000) { return Math.max(0, n - nowMs); }
    return Math.max(0, n * 1000 - nowMs);
  }
  var parsed = new Date(text).getTime();
  if (isNaN(parsed)) { return null; }
  return Math.max(0, parsed - Date.now());
}

// Blocking retry with backoff. Delay resolution order: callback delay,
// then Retry-After header, then exponential backoff; jitter widens, the
// max clamps. At most opts.attempts invocations; attempts=1 never sleeps.
function __withRetries(fn, opts) {
  opts = opts || {};
  var attempts = Math.max(1, opts.attempts || 3);
  var initialDelayMs = opts.initialDelayMs === undefined ? 500 : opts.initialDelayMs;
  var backoffFactor = opts.backoffFactor === undefined ? 2 : opts.backoffFactor;
  var maxDelayMs = opts.maxDelayMs === undefined ? 10000 : opts.maxDelayMs;
  var jitter = opts.jitter || 0;

  var lastError = null;
  for (var attempt = 1; attempt <= attempts; attempt++) {
    try {
      return fn(attempt);
    } catch (err) {
      lastError = err;
      var status = err ? err.status : undefined;
      var headers = (err && err.headers) || {};
      var retryAfterMs = __parseRetryAfterMs(__headerValue(headers, 'retry-after'));
      var backoffMs = Math.min(initialDelayMs * Math.pow(backoffFactor, attempt - 1), maxDelayMs);
      var delayMs = retryAfterMs === null ? backoffMs : retryAfterMs;

      var shouldRetry = status === undefined || status === null ||
        status === 429 || (status >= 500 && status < 600);
      if (opts.retryOn) {
        var decision = opts.retryOn({
          attempt: attempt,
          error: err,
          response: (err && err.response) || null,
          delayMs: delayMs,
          retryAfterMs: retryAfterMs
        }) || {};
        if (decision.retry !== undefined) { shouldRetry = decision.retry; }
        if (decision.delayMs !== undefined) { delayMs = decision.delayMs; }
      }

      if (!shouldRetry || attempt >= attempts) {
        if (shouldRetry && attempt >= attempts) {
          __log('warn', 'http.retries_exhausted', { attempts: attempts, status: status });
        }
        throw lastError;
      }

      if (jitter > 0) { delayMs = delayMs * (1 + jitter * Math.random()); }
      delayMs = Math.min(delayMs, maxDelayMs);
      Utilities.sleep(delayMs);
    }
  }
  throw lastError;
}

// Adds quota-header awareness on top of __withRetries: zero remaining
// quota forces a retry, waiting the larger of the reset delay and any
// delay a caller-supplied retryOn requested.
function __rateLimitAware(fn, opts) {
  opts = opts || {};
  var callerRetryOn = opts.retryOn;
  var merged = {};
  for (var key in opts) { merged[key] = opts[key]; }
  merged.retryOn = function (ctx) {
    var caller = callerRetryOn ? (callerRetryOn(ctx) || {}) : {};
    var headers = (ctx.error && ctx.error.headers) || {};
    var remaining = __headerValue(headers, 'x-ratelimit-remaining');
    if (remaining === null) { remaining = __headerValue(headers, 'x-rate-limit-remaining'); }
    if (remaining === null || parseInt(String(remaining).trim(), 10) !== 0) {
      return caller;
    }
    var reset = __headerValue(headers, 'x-ratelimit-reset');
    if (reset === null) { reset = __headerValue(headers, 'x-rate-limit-reset'); }
    var resetMs = __parseRetryAfterMs(reset);
    if (resetMs === null) { resetMs = ctx.delayMs; }
    var callerDelay = caller.delayMs === undefined ? 0 : caller.delayMs;
    return { retry: true, delayMs: Math.max(resetMs, callerDelay) };
  };
  return __withRetries(fn, merged);
}

// One fetch attempt; 4xx/5xx throw an error carrying status/headers/body
// so the retry layer can decide.
function __fetch(method, url, headers, payload) {
  var params = { method: method, headers: headers || {}, muteHttpExceptions: true };
  if (payload !== undefined && payload !== null) { params.payload = payload; }
  var response = UrlFetchApp.fetch(url, params);
  var status = response.getResponseCode();
  var result = { status: status, headers: response.getAllHeaders(), body: response.getContentText() };
  if (status >= 400) {
    var err = new Error('HTTP ' + status + ' from ' + url);
    err.status = status;
    err.headers = result.headers;
    err.body = result.body;
    err.response = result;
    throw err;
  }
  return result;
}

function __getSecret(name, opts) {
  opts = opts || {};
  var candidates = [];
  var push = function (key) {
    if (key && candidates.indexOf(key) === -1) { candidates.push(key); }
  };
  push(name);
  push(opts.mapTo);
  var builtin = (opts.connectorKey && __SECRET_ALIASES[opts.connectorKey]) || [];
  for (var i = 0; i < builtin.length; i++) { push(builtin[i]); }
  var extra = opts.aliases || [];
  for (var j = 0; j < extra.length; j++) { push(extra[j]); }

  var props = PropertiesService.getScriptProperties();
  var resolved = null;
  var resolvedKey = null;
  for (var k = 0; k < candidates.length; k++) {
    var value = props.getProperty(candidates[k]);
    if (value !== null) { resolved = value; resolvedKey = candidates[k]; break; }
  }
  if (resolved === null) {
    var doc = props.getProperty(__SECRET_EXPORT_KEY);
    if (doc !== null) {
      var map = null;
      try { map = JSON.parse(doc); } catch (e) { map = null; }
      if (map) {
        for (var m = 0; m < candidates.length; m++) {
          if (typeof map[candidates[m]] === 'string') {
            resolved = map[candidates[m]];
            resolvedKey = candidates[m];
            break;
          }
        }
      }
    }
  }
  if (resolved === null && opts.defaultValue !== undefined) { return opts.defaultValue; }
  if (resolved === null) {
    var err = new Error('missing secret ' + name + ' (tried: ' + candidates.join(', ') + ')');
    err.name = 'MissingSecretError';
    err.tried = candidates;
    throw err;
  }
  if (opts.logResolved) { __log('info', 'secret.resolved', { key: resolvedKey }); }
  if (__isSealedToken(resolved)) { return __decodeSealedToken(resolved).payload; }
  return resolved;
}

function __requireOAuthToken(connectorKey, opts) {
  opts = opts || {};
  var aliases = __SECRET_ALIASES[connectorKey] || [];
  var property = aliases.length > 0 ? aliases[0] : connectorKey.toUpperCase() + '_OAUTH_TOKEN';
  try {
    return __getSecret(property, { connectorKey: connectorKey });
  } catch (err) {
    if (err && err.name === 'MissingSecretError') {
      var scopes = opts.scopes || [];
      var out = new Error('connector ' + connectorKey + ' has no OAuth token: set script property ' +
        property + ' (or one of: ' + aliases.join(', ') + ') with scopes [' + scopes.join(', ') + ']');
      out.name = 'MissingSecretError';
      throw out;
    }
    throw err;
  }
}

function __isSealedToken(value) {
  return typeof value === 'string' && value.indexOf(__SEAL_PREFIX) === 0;
}

function __stringToBytes(text) {
  return Utilities.newBlob(text).getBytes();
}

function __bytesToString(bytes) {
  return Utilities.newBlob(bytes).getDataAsString();
}

function __be32(n) {
  return [(n >>> 24) & 255, (n >>> 16) & 255, (n >>> 8) & 255, n & 255];
}

// Big-endian 8-byte encoding of a non-negative integer timestamp.
function __be64(n) {
  var high = Math.floor(n / 4294967296);
  var low = n % 4294967296;
  return __be32(high).concat(__be32(low));
}

function __toSigned(bytes) {
  var out = [];
  for (var i = 0; i < bytes.length; i++) {
    var b = bytes[i] & 255;
    out.push(b > 127 ? b - 256 : b);
  }
  return out;
}

function __hmacSha256(keyBytes, dataBytes) {
  return Utilities.computeHmacSha256Signature(__toSigned(dataBytes), __toSigned(keyBytes));
}

function __constantTimeEquals(a, b) {
  if (a.length !== b.length) { return false; }
  var diff = 0;
  for (var i = 0; i < a.length; i++) {
    diff = diff | ((a[i] & 255) ^ (b[i] & 255));
  }
  return diff === 0;
}

function __sealKeystream(keyBytes, ivBytes, length) {
  var stream = [];
  var counter = 0;
  var label = __stringToBytes(__SEAL_STREAM_LABEL);
  while (stream.length < length) {
    var block = __hmacSha256(keyBytes, ivBytes.concat(__be32(counter)).concat(label));
    for (var i = 0; i < block.length && stream.length < length; i++) {
      stream.push(block[i] & 255);
    }
    counter = counter + 1;
  }
  return stream;
}

function __sealTag(keyBytes, ivBytes, ctBytes, envelope) {
  var data = __stringToBytes(__SEAL_META_LABEL)
    .concat(ivBytes)
    .concat(ctBytes)
    .concat(__be64(envelope.iat))
    .concat(__be64(envelope.exp))
    .concat(__stringToBytes(envelope.purpose));
  return __hmacSha256(keyBytes, data);
}

function __integrityError() {
  var err = new Error('sealed token failed integrity check');
  err.name = 'IntegrityError';
  return err;
}

function __decodeSealedToken(raw) {
  if (!__isSealedToken(raw)) {
    throw new Error('sealed token malformed: missing prefix');
  }
  var envelope;
  try {
    envelope = JSON.parse(__bytesToString(Utilities.base64Decode(raw.slice(__SEAL_PREFIX.length))));
  } catch (e) {
    throw new Error('sealed token malformed: envelope is not valid JSON');
  }
  if (envelope.v !== __SEAL_VERSION) {
    throw new Error('sealed token version ' + envelope.v + ' is not supported');
  }
  if (Date.now() > envelope.exp) {
    var expired = new Error('sealed token expired at ' + envelope.exp);
    expired.name = 'ExpiredTokenError';
    throw expired;
  }

  var key = Utilities.base64Decode(envelope.k);
  var iv = Utilities.base64Decode(envelope.iv);
  var ct = Utilities.base64Decode(envelope.ct);
  var tag = Utilities.base64Decode(envelope.tag);

  var stream = __sealKeystream(key, iv, ct.length);
  var plain = [];
  for (var i = 0; i < ct.length; i++) {
    plain.push((ct[i] & 255) ^ stream[i]);
  }

  if (!__constantTimeEquals(__sealTag(key, iv, ct, envelope), tag)) {
    throw __integrityError();
  }

  var inner;
  try {
    inner = JSON.parse(__bytesToString(__toSigned(plain)));
  } catch (e) {
    throw new Error('sealed token malformed: decrypted payload is not valid JSON');
  }
  if (inner.iat !== envelope.iat || inner.exp !== envelope.exp || inner.purpose !== envelope.purpose) {
    throw __integrityError();
  }
  return { payload: inner.payload, issuedAt: envelope.iat, expiresAt: envelope.exp, purpose: envelope.purpose };
}

function __loadTriggerRegistry() {
  var doc = PropertiesService.getScriptProperties().getProperty(__TRIGGER_REGISTRY_KEY);
  if (doc === null) { return {}; }
  try { return JSON.parse(doc) || {}; } catch (e) { return {}; }
}

function __saveTriggerRegistry(registry) {
  PropertiesService.getScriptProperties().setProperty(__TRIGGER_REGISTRY_KEY, JSON.stringify(registry));
}

function __liveTriggerIds() {
  var triggers = ScriptApp.getProjectTriggers();
  var ids = [];
  for (var i = 0; i < triggers.length; i++) {
    ids.push(String(triggers[i].getUniqueId()));
  }
  return ids;
}

function __deleteTriggerById(id) {
  var triggers = ScriptApp.getProjectTriggers();
  for (var i = 0; i < triggers.length; i++) {
    if (String(triggers[i].getUniqueId()) === id) {
      ScriptApp.deleteTrigger(triggers[i]);
      return true;
    }
  }
  return false;
}

// Idempotent across recompiles: an entry whose id is still live is left
// alone; a stale entry is rebuilt, never reused.
function __ensureTrigger(key, handler, kind, builderFn, description) {
  var registry = __loadTriggerRegistry();
  var entry = registry[key];
  if (entry && __liveTriggerIds().indexOf(entry.id) !== -1) {
    return entry.id;
  }
  if (entry) {
    __log('info', 'trigger.rebuild', { key: key, staleId: entry.id });
  }
  var id = builderFn();
  registry[key] = {
    key: key,
    id: id,
    handler: handler,
    kind: kind,
    description: description || '',
    updatedAt: new Date().toISOString()
  };
  __saveTriggerRegistry(registry);
  return id;
}

// After this runs, the registered trigger set exactly matches activeKeys.
function __syncTriggerRegistry(activeKeys) {
  var registry = __loadTriggerRegistry();
  var removed = [];
  for (var key in registry) {
    if (activeKeys.indexOf(key) !== -1) { continue; }
    __deleteTriggerById(registry[key].id);
    removed.push(key);
  }
  for (var i = 0; i < removed.length; i++) {
    __log('info', 'trigger.removed', { key: removed[i] });
    delete registry[removed[i]];
  }
  if (removed.length > 0) { __saveTriggerRegistry(registry); }
  return removed;
}

function __clearTriggerByKey(key) {
  var registry = __loadTriggerRegistry();
  var entry = registry[key];
  if (!entry) { return false; }
  __deleteTriggerById(entry.id);
  delete registry[key];
  __saveTriggerRegistry(registry);
  return true;
}

// Builds a recurring or one-shot time trigger from a declarative config:
// { handler, every, unit, atHour } or { handler, atMs }.
function __buildTimeTrigger(config) {
  if (config.atMs !== undefined && config.atMs !== null) {
    return String(ScriptApp.newTrigger(config.handler).timeBased()
      .at(new Date(config.atMs)).create().getUniqueId());
  }
  var builder = ScriptApp.newTrigger(config.handler).timeBased();
  var every = config.every || 15;
  var unit = config.unit || 'minutes';
  if (unit === 'minutes') {
    builder = builder.everyMinutes(every);
  } else if (unit === 'hours') {
    builder = builder.everyHours(every);
  } else {
    builder = builder.everyDays(every);
    if (config.atHour !== undefined && config.atHour !== null) {
      builder = builder.atHour(config.atHour);
    }
  }
  return String(builder.create().getUniqueId());
}

// Deterministic idempotency identifier from workflow, step, and payload.
function __idempotencyKey(workflowId, step, payload) {
  var seed = [];
  seed = seed.concat(__stringToBytes(workflowId));
  seed.push(0);
  seed = seed.concat(__stringToBytes(step));
  seed.push(0);
  seed = seed.concat(__stringToBytes(payload));
  var digest = Utilities.computeDigest(Utilities.DigestAlgorithm.SHA_256, __toSigned(seed));
  var hexChars = '0123456789abcdef';
  var out = '';
  for (var i = 0; i < digest.length; i++) {
    var b = digest[i] & 255;
    out += hexChars.charAt(b >> 4) + hexChars.charAt(b & 15);
  }
  return out;
}
"#;
